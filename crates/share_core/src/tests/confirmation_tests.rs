use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
struct Calls {
    confirmed: AtomicUsize,
    cancelled: AtomicUsize,
}

impl Calls {
    fn confirmed(&self) -> usize {
        self.confirmed.load(Ordering::SeqCst)
    }

    fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }
}

fn propose(
    coordinator: &ConfirmationCoordinator,
    scope: &Scope,
    entity: &str,
    calls: &Arc<Calls>,
) -> PendingRemoval {
    let on_confirm = Arc::clone(calls);
    let on_cancel = Arc::clone(calls);
    coordinator.propose_removal(
        scope,
        CaseId::new("C1"),
        EntityId::new(entity),
        move |_| {
            on_confirm.confirmed.fetch_add(1, Ordering::SeqCst);
        },
        move || {
            on_cancel.cancelled.fetch_add(1, Ordering::SeqCst);
        },
    )
}

fn setup() -> (Arc<EventBus>, ConfirmationCoordinator, Scope) {
    let bus = Arc::new(EventBus::new());
    let coordinator = ConfirmationCoordinator::with_timeout(Arc::clone(&bus), None);
    (bus, coordinator, Scope::page("cases"))
}

#[test]
fn confirm_runs_on_confirm_once_and_returns_to_idle() {
    let (bus, coordinator, scope) = setup();
    let calls = Arc::new(Calls::default());

    let pending = propose(&coordinator, &scope, "00Q00000000AAA1", &calls);
    assert_eq!(coordinator.state(), CoordinatorState::AwaitingConfirmation);
    assert_eq!(coordinator.pending(), Some(pending));
    assert_eq!(bus.listener_count(EventName::ConfirmRemoval), 1);
    assert_eq!(bus.listener_count(EventName::CancelRemoval), 1);

    bus.emit(&scope, BusEvent::ConfirmRemoval);
    assert_eq!(calls.confirmed(), 1);
    assert_eq!(calls.cancelled(), 0);
    assert_eq!(coordinator.state(), CoordinatorState::Idle);
    assert_eq!(coordinator.pending(), None);
    assert_eq!(bus.listener_count(EventName::ConfirmRemoval), 0);
    assert_eq!(bus.listener_count(EventName::CancelRemoval), 0);

    bus.emit(&scope, BusEvent::ConfirmRemoval);
    bus.emit(&scope, BusEvent::CancelRemoval);
    assert_eq!(calls.confirmed(), 1);
    assert_eq!(calls.cancelled(), 0);
}

#[test]
fn cancel_runs_on_cancel_once() {
    let (bus, coordinator, scope) = setup();
    let calls = Arc::new(Calls::default());

    propose(&coordinator, &scope, "00Q00000000AAA1", &calls);
    bus.emit(&scope, BusEvent::CancelRemoval);
    bus.emit(&scope, BusEvent::ConfirmRemoval);

    assert_eq!(calls.cancelled(), 1);
    assert_eq!(calls.confirmed(), 0);
    assert_eq!(coordinator.state(), CoordinatorState::Idle);
}

#[test]
fn newer_proposal_discards_previous_callbacks() {
    let (bus, coordinator, scope) = setup();
    let first = Arc::new(Calls::default());
    let second = Arc::new(Calls::default());

    propose(&coordinator, &scope, "00Q00000000AAA1", &first);
    let pending = propose(&coordinator, &scope, "00Q00000000BBB2", &second);
    assert_eq!(coordinator.pending(), Some(pending));
    assert_eq!(bus.listener_count(EventName::ConfirmRemoval), 1);

    bus.emit(&scope, BusEvent::ConfirmRemoval);
    assert_eq!(first.confirmed() + first.cancelled(), 0);
    assert_eq!(second.confirmed(), 1);
}

#[test]
fn signals_on_other_pages_are_ignored() {
    let (bus, coordinator, scope) = setup();
    let calls = Arc::new(Calls::default());

    propose(&coordinator, &scope, "00Q00000000AAA1", &calls);
    assert_eq!(bus.emit(&Scope::page("elsewhere"), BusEvent::ConfirmRemoval), 0);
    assert_eq!(coordinator.state(), CoordinatorState::AwaitingConfirmation);

    bus.emit(&Scope::Global, BusEvent::ConfirmRemoval);
    assert_eq!(calls.confirmed(), 1);
}

#[test]
fn proposal_is_announced_on_its_scope() {
    let (bus, coordinator, scope) = setup();
    let announced = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&announced);
    bus.register(
        EventName::ProposeRemoval,
        scope.clone(),
        OwnerId::from("observer"),
        Arc::new(move |event: &BusEvent| -> anyhow::Result<()> {
            sink.lock().expect("announced").push(event.clone());
            Ok(())
        }),
    );

    propose(
        &coordinator,
        &scope,
        "00Q00000000AAA1",
        &Arc::new(Calls::default()),
    );

    let announced = announced.lock().expect("announced");
    assert_eq!(
        *announced,
        [BusEvent::ProposeRemoval(RemovalTarget {
            case_id: CaseId::new("C1"),
            entity_id: EntityId::new("00Q00000000AAA1"),
        })]
    );
}

#[test]
fn late_confirmation_is_treated_as_cancel() {
    let bus = Arc::new(EventBus::new());
    let coordinator = ConfirmationCoordinator::with_timeout(Arc::clone(&bus), Some(Duration::ZERO));
    let scope = Scope::page("cases");
    let calls = Arc::new(Calls::default());

    propose(&coordinator, &scope, "00Q00000000AAA1", &calls);
    bus.emit(&scope, BusEvent::ConfirmRemoval);

    assert_eq!(calls.confirmed(), 0);
    assert_eq!(calls.cancelled(), 1);
    assert_eq!(coordinator.state(), CoordinatorState::Idle);
}

#[test]
fn expire_stale_resolves_only_expired_proposals() {
    let (bus, coordinator, scope) = setup();
    let calls = Arc::new(Calls::default());
    propose(&coordinator, &scope, "00Q00000000AAA1", &calls);
    assert!(!coordinator.expire_stale());

    let expiring = ConfirmationCoordinator::with_timeout(Arc::clone(&bus), Some(Duration::ZERO));
    let expiring_calls = Arc::new(Calls::default());
    propose(&expiring, &Scope::page("other"), "00Q00000000BBB2", &expiring_calls);
    assert!(expiring.expire_stale());
    assert!(!expiring.expire_stale());
    assert_eq!(expiring_calls.cancelled(), 1);
    assert_eq!(expiring.state(), CoordinatorState::Idle);
    assert_eq!(coordinator.state(), CoordinatorState::AwaitingConfirmation);
}

#[test]
fn dropping_coordinator_releases_its_listeners() {
    let (bus, coordinator, scope) = setup();
    propose(
        &coordinator,
        &scope,
        "00Q00000000AAA1",
        &Arc::new(Calls::default()),
    );
    drop(coordinator);
    assert_eq!(bus.listener_count(EventName::ConfirmRemoval), 0);
    assert_eq!(bus.emit(&scope, BusEvent::ConfirmRemoval), 0);
}

#[test]
fn modal_shows_on_proposal_and_emits_decision() {
    let (bus, coordinator, scope) = setup();
    let modal = ConfirmationModal::new(Arc::clone(&bus), scope.clone());
    let first = modal.attach();
    assert_eq!(modal.attach(), first);
    assert!(!modal.is_visible());

    let calls = Arc::new(Calls::default());
    propose(&coordinator, &scope, "00Q00000000AAA1", &calls);
    assert_eq!(
        modal.shown_for().map(|target| target.entity_id),
        Some(EntityId::new("00Q00000000AAA1"))
    );

    assert_eq!(modal.confirm(), 1);
    assert!(!modal.is_visible());
    assert_eq!(calls.confirmed(), 1);
    assert_eq!(modal.cancel(), 0);
    assert_eq!(calls.cancelled(), 0);
}

#[test]
fn detached_modal_stops_listening() {
    let (bus, coordinator, scope) = setup();
    let modal = ConfirmationModal::new(Arc::clone(&bus), scope.clone());
    modal.attach();
    modal.detach();

    propose(
        &coordinator,
        &scope,
        "00Q00000000AAA1",
        &Arc::new(Calls::default()),
    );
    assert!(!modal.is_visible());
    assert_eq!(bus.listener_count(EventName::ProposeRemoval), 0);
}

#[test]
fn detaching_one_modal_keeps_other_modals_listening() {
    let bus = Arc::new(EventBus::new());
    let page_a = Scope::page("a");
    let page_b = Scope::page("b");
    let modal_a = ConfirmationModal::new(Arc::clone(&bus), page_a.clone());
    let modal_b = ConfirmationModal::new(Arc::clone(&bus), page_b.clone());
    modal_a.attach();
    modal_b.attach();
    assert_eq!(bus.listener_count(EventName::ProposeRemoval), 2);

    modal_a.detach();
    assert_eq!(bus.listener_count(EventName::ProposeRemoval), 1);

    let coordinator = ConfirmationCoordinator::new(Arc::clone(&bus));
    let calls = Arc::new(Calls::default());
    propose(&coordinator, &page_b, "00Q00000000AAA1", &calls);
    assert!(modal_b.is_visible());
    assert!(!modal_a.is_visible());

    assert_eq!(modal_b.confirm(), 1);
    assert_eq!(calls.confirmed(), 1);
}
