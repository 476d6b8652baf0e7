// tests/integration/registry_test.rs

use super::test_helpers::{TestConn, registry_with};
use messenger::core::MessengerError;
use messenger::core::protocol::Delivery;
use messenger::core::state::{
    ConnectionId, OutboundMessage, RegistryStats, RouteOutcome, SessionRegistry, outbox,
};

#[test]
fn test_register_rejects_taken_nickname_online_or_not() {
    let registry = registry_with(&["alice"]);
    assert_eq!(
        registry.register("alice", "Someone Else"),
        Err(MessengerError::NickTaken)
    );

    let c1 = TestConn::new(1);
    c1.login(&registry, "alice");
    assert_eq!(
        registry.register("alice", "Someone Else"),
        Err(MessengerError::NickTaken)
    );
    registry.check_consistency().unwrap();
}

#[test]
fn test_register_validates_fields() {
    let registry = SessionRegistry::new();
    assert!(matches!(
        registry.register("", "Alice"),
        Err(MessengerError::BadFormat(_))
    ));
    assert!(matches!(
        registry.register("al ice", "Alice"),
        Err(MessengerError::BadFormat(_))
    ));
    assert!(matches!(
        registry.register(&"a".repeat(33), "Alice"),
        Err(MessengerError::BadFormat(_))
    ));
    assert!(matches!(
        registry.register("alice", "   "),
        Err(MessengerError::BadFormat(_))
    ));
    assert_eq!(registry.stats().registered, 0);

    registry.register(&"a".repeat(32), "Long Nick").unwrap();
    registry.register("Alice_2", "Alice Two").unwrap();
    assert_eq!(registry.stats().registered, 2);
}

#[test]
fn test_login_errors() {
    let registry = registry_with(&["alice", "bob"]);
    let c1 = TestConn::new(1);
    let c2 = TestConn::new(2);

    assert_eq!(
        registry.login("nobody", c1.id, c1.outbox.clone()),
        Err(MessengerError::NoSuchUser)
    );
    assert!(matches!(
        registry.login("bad nick", c1.id, c1.outbox.clone()),
        Err(MessengerError::BadFormat(_))
    ));

    c1.login(&registry, "alice");
    assert_eq!(
        registry.login("alice", c2.id, c2.outbox.clone()),
        Err(MessengerError::AlreadyOnline)
    );
    assert!(matches!(
        registry.login("bob", c1.id, c1.outbox.clone()),
        Err(MessengerError::InvalidState(_))
    ));
    assert!(!registry.is_online("bob"));
    assert_eq!(registry.nickname_of(c1.id).as_deref(), Some("alice"));
    registry.check_consistency().unwrap();
}

#[test]
fn test_login_logout_allows_login_elsewhere() {
    let registry = registry_with(&["alice"]);
    let c1 = TestConn::new(1);
    let c2 = TestConn::new(2);

    c1.login(&registry, "alice");
    assert_eq!(registry.logout(c1.id).unwrap(), "alice");
    assert!(!registry.is_online("alice"));
    assert!(matches!(
        registry.logout(c1.id),
        Err(MessengerError::InvalidState(_))
    ));

    c2.login(&registry, "alice");
    assert_eq!(registry.nickname_of(c2.id).as_deref(), Some("alice"));
    assert_eq!(registry.nickname_of(c1.id), None);
    registry.check_consistency().unwrap();
}

#[test]
fn test_store_and_forward() {
    let registry = registry_with(&["alice", "bob"]);
    let c1 = TestConn::new(1);
    let c2 = TestConn::new(2);
    c1.login(&registry, "alice");

    let outcome = registry.route(c1.id, "bob", "hi").unwrap();
    assert_eq!(outcome, RouteOutcome::Queued { depth: 1 });
    assert_eq!(registry.pending_for("bob"), 1);

    let drained = registry.login("bob", c2.id, c2.outbox.clone()).unwrap();
    assert_eq!(drained.len(), 1);
    assert_eq!(drained[0].from, "alice");
    assert_eq!(drained[0].text, "hi");
    assert_eq!(registry.pending_for("bob"), 0);
    registry.check_consistency().unwrap();
}

#[test]
fn test_pending_queue_is_fifo() {
    let registry = registry_with(&["alice", "bob"]);
    let c1 = TestConn::new(1);
    let c2 = TestConn::new(2);
    c1.login(&registry, "alice");

    for text in ["one", "two", "three"] {
        registry.route(c1.id, "bob", text).unwrap();
    }
    let drained = registry.login("bob", c2.id, c2.outbox.clone()).unwrap();
    let texts: Vec<_> = drained.iter().map(|d| d.text.as_str()).collect();
    assert_eq!(texts, ["one", "two", "three"]);
}

#[test]
fn test_immediate_delivery_skips_queue() {
    let registry = registry_with(&["alice", "bob"]);
    let c1 = TestConn::new(1);
    let mut c2 = TestConn::new(2);
    c1.login(&registry, "alice");
    c2.login(&registry, "bob");

    let outcome = registry.route(c1.id, "bob", "hi").unwrap();
    assert_eq!(outcome, RouteOutcome::Delivered { connection: c2.id });
    assert_eq!(registry.pending_for("bob"), 0);

    let outbound = c2.rx.try_recv().expect("delivery pushed onto outbox");
    assert_eq!(outbound.recipient, "bob");
    assert_eq!(outbound.delivery.from, "alice");
    assert_eq!(outbound.delivery.text, "hi");
}

#[test]
fn test_message_to_self_is_delivered() {
    let registry = registry_with(&["alice"]);
    let mut c1 = TestConn::new(1);
    c1.login(&registry, "alice");

    let outcome = registry.route(c1.id, "alice", "note to self").unwrap();
    assert_eq!(outcome, RouteOutcome::Delivered { connection: c1.id });
    assert_eq!(c1.rx.try_recv().unwrap().delivery.from, "alice");
}

#[test]
fn test_route_errors_in_order() {
    let registry = registry_with(&["alice", "bob"]);
    let c1 = TestConn::new(1);

    // Not logged in wins over every other problem.
    assert!(matches!(
        registry.route(c1.id, "bad nick", ""),
        Err(MessengerError::Unauthorized(_))
    ));

    c1.login(&registry, "alice");
    assert!(matches!(
        registry.route(c1.id, "bad nick", "hi"),
        Err(MessengerError::BadFormat(_))
    ));
    assert!(matches!(
        registry.route(c1.id, "bob", ""),
        Err(MessengerError::BadFormat(_))
    ));
    assert!(matches!(
        registry.route(c1.id, "bob", &"x".repeat(4097)),
        Err(MessengerError::BadFormat(_))
    ));
    assert_eq!(
        registry.route(c1.id, "nobody", "hi"),
        Err(MessengerError::NoSuchUser)
    );
    assert_eq!(registry.stats().queued, 0);

    registry.route(c1.id, "bob", &"x".repeat(4096)).unwrap();
    assert_eq!(registry.pending_for("bob"), 1);
}

#[test]
fn test_online_recipient_gets_every_message_in_order() {
    let registry = registry_with(&["alice", "bob"]);
    let c1 = TestConn::new(1);
    let (bob_outbox, mut bob_rx) = outbox();
    let c2 = ConnectionId::new(2);
    c1.login(&registry, "alice");
    registry.login("bob", c2, bob_outbox).unwrap();

    // A reader that falls behind still gets everything, in order, and nothing
    // is parked in the queue while it is online.
    for i in 0..1000 {
        assert_eq!(
            registry.route(c1.id, "bob", &format!("m{i}")).unwrap(),
            RouteOutcome::Delivered { connection: c2 }
        );
    }
    assert_eq!(registry.pending_for("bob"), 0);
    for i in 0..1000 {
        assert_eq!(bob_rx.try_recv().unwrap().delivery.text, format!("m{i}"));
    }
}

#[test]
fn test_closed_outbox_falls_back_to_queue() {
    let registry = registry_with(&["alice", "bob"]);
    let c1 = TestConn::new(1);
    c1.login(&registry, "alice");
    let c2 = TestConn::new(2);
    c2.login(&registry, "bob");
    drop(c2.rx);

    assert_eq!(
        registry.route(c1.id, "bob", "hi").unwrap(),
        RouteOutcome::Queued { depth: 1 }
    );
}

#[test]
fn test_list_users_in_registration_order() {
    let registry = registry_with(&["carol", "alice", "bob"]);
    let c1 = TestConn::new(1);
    c1.login(&registry, "alice");

    let users = registry.list_users();
    let names: Vec<_> = users.iter().map(|u| u.nickname.as_str()).collect();
    assert_eq!(names, ["carol", "alice", "bob"]);
    let online: Vec<_> = users.iter().map(|u| u.online).collect();
    assert_eq!(online, [false, true, false]);
    assert_eq!(users[0].full_name, "carol full name");
}

#[test]
fn test_cleanup_is_idempotent() {
    let registry = registry_with(&["alice"]);
    let c1 = TestConn::new(1);
    c1.login(&registry, "alice");

    assert_eq!(registry.cleanup(c1.id).as_deref(), Some("alice"));
    let after_first = registry.stats();
    assert_eq!(registry.cleanup(c1.id), None);
    assert_eq!(registry.stats(), after_first);
    assert!(!registry.is_online("alice"));
    assert_eq!(registry.cleanup(ConnectionId::new(99)), None);
    registry.check_consistency().unwrap();
}

#[test]
fn test_delete_requires_logout() {
    let registry = registry_with(&["alice", "bob"]);
    let c1 = TestConn::new(1);
    let c2 = TestConn::new(2);
    c1.login(&registry, "alice");
    c2.login(&registry, "bob");
    registry.logout(c2.id).unwrap();
    registry.route(c1.id, "bob", "one").unwrap();
    registry.route(c1.id, "bob", "two").unwrap();

    let drained = registry.login("bob", c2.id, c2.outbox.clone()).unwrap();
    assert_eq!(drained.len(), 2);
    assert!(matches!(
        registry.delete_user("bob", c2.id),
        Err(MessengerError::InvalidState(_))
    ));

    registry.logout(c2.id).unwrap();
    registry.route(c1.id, "bob", "three").unwrap();
    assert_eq!(registry.delete_user("bob", c2.id), Ok(1));
    assert_eq!(registry.pending_for("bob"), 0);
    assert!(registry.list_users().iter().all(|u| u.nickname != "bob"));
    assert_eq!(
        registry.route(c1.id, "bob", "four"),
        Err(MessengerError::NoSuchUser)
    );

    // The nickname is free again.
    registry.register("bob", "New Bob").unwrap();
    assert_eq!(registry.pending_for("bob"), 0);
    registry.check_consistency().unwrap();
}

#[test]
fn test_delete_authorization() {
    let registry = registry_with(&["alice", "bob", "carol"]);
    let c1 = TestConn::new(1);
    let c2 = TestConn::new(2);

    assert!(matches!(
        registry.delete_user("bad nick", c1.id),
        Err(MessengerError::BadFormat(_))
    ));
    assert_eq!(
        registry.delete_user("nobody", c1.id),
        Err(MessengerError::NoSuchUser)
    );
    // Never logged in: nobody owns it yet.
    assert!(matches!(
        registry.delete_user("carol", c1.id),
        Err(MessengerError::Unauthorized(_))
    ));

    c1.login(&registry, "alice");
    registry.logout(c1.id).unwrap();

    // Another connection may not delete it.
    assert!(matches!(
        registry.delete_user("alice", c2.id),
        Err(MessengerError::Unauthorized(_))
    ));

    // The owner may not either while acting as someone else.
    c1.login(&registry, "bob");
    assert!(matches!(
        registry.delete_user("alice", c1.id),
        Err(MessengerError::Unauthorized(_))
    ));

    registry.logout(c1.id).unwrap();
    assert_eq!(registry.delete_user("alice", c1.id), Ok(0));
    registry.check_consistency().unwrap();
}

#[test]
fn test_delete_after_disconnect_by_same_connection_only() {
    let registry = registry_with(&["alice"]);
    let c1 = TestConn::new(1);
    c1.login(&registry, "alice");
    registry.cleanup(c1.id);

    // Identities are never reused, so once the owning connection is gone the
    // account cannot be deleted by a newcomer.
    assert!(matches!(
        registry.delete_user("alice", ConnectionId::new(2)),
        Err(MessengerError::Unauthorized(_))
    ));
}

#[test]
fn test_requeue_front_keeps_order_ahead_of_newer_messages() {
    let registry = registry_with(&["alice", "bob"]);
    let c1 = TestConn::new(1);
    c1.login(&registry, "alice");
    registry.route(c1.id, "bob", "three").unwrap();

    let undelivered = ["one", "two"]
        .into_iter()
        .map(|text| OutboundMessage {
            recipient: "bob".to_string(),
            delivery: Delivery {
                from: "alice".to_string(),
                text: text.to_string(),
                timestamp: 0,
            },
        })
        .collect();
    registry.requeue_front(undelivered);

    let c2 = TestConn::new(2);
    let drained = registry.login("bob", c2.id, c2.outbox.clone()).unwrap();
    let texts: Vec<_> = drained.iter().map(|d| d.text.as_str()).collect();
    assert_eq!(texts, ["one", "two", "three"]);
}

fn outbound(recipient: &str, text: &str) -> OutboundMessage {
    OutboundMessage {
        recipient: recipient.to_string(),
        delivery: Delivery {
            from: "alice".to_string(),
            text: text.to_string(),
            timestamp: 0,
        },
    }
}

#[test]
fn test_requeue_front_reaches_recipient_online_elsewhere() {
    let registry = registry_with(&["alice", "bob"]);
    let c1 = TestConn::new(1);
    let c2 = TestConn::new(2);
    let mut c3 = TestConn::new(3);
    c1.login(&registry, "alice");
    c2.login(&registry, "bob");
    registry.logout(c2.id).unwrap();
    c3.login(&registry, "bob");

    registry.requeue_front(vec![outbound("bob", "m1")]);

    assert_eq!(registry.pending_for("bob"), 0);
    let requeued = c3.rx.try_recv().unwrap();
    assert_eq!(requeued.recipient, "bob");
    assert_eq!(requeued.delivery.text, "m1");
}

#[test]
fn test_logout_reclaiming_returns_buffered_messages_in_order() {
    let registry = registry_with(&["alice", "bob"]);
    let c1 = TestConn::new(1);
    let mut c2 = TestConn::new(2);
    c1.login(&registry, "alice");
    c2.login(&registry, "bob");
    registry.route(c1.id, "bob", "one").unwrap();
    registry.route(c1.id, "bob", "two").unwrap();

    assert_eq!(
        registry.logout_reclaiming(c2.id, &mut c2.rx).unwrap(),
        "bob"
    );
    assert!(c2.rx.try_recv().is_err());
    registry.route(c1.id, "bob", "three").unwrap();

    let c3 = TestConn::new(3);
    let drained = registry.login("bob", c3.id, c3.outbox.clone()).unwrap();
    let texts: Vec<_> = drained.iter().map(|d| d.text.as_str()).collect();
    assert_eq!(texts, ["one", "two", "three"]);

    // Not logged in any more.
    assert!(matches!(
        registry.logout_reclaiming(c2.id, &mut c2.rx),
        Err(MessengerError::InvalidState(_))
    ));
    registry.check_consistency().unwrap();
}

#[test]
fn test_release_requeues_unsent_ahead_of_buffered() {
    let registry = registry_with(&["alice", "bob"]);
    let c1 = TestConn::new(1);
    let mut c2 = TestConn::new(2);
    c1.login(&registry, "alice");
    c2.login(&registry, "bob");
    registry.route(c1.id, "bob", "buffered").unwrap();

    let released = registry.release(c2.id, &mut c2.rx, vec![outbound("bob", "unsent")]);
    assert_eq!(released.as_deref(), Some("bob"));
    assert!(!registry.is_online("bob"));
    assert_eq!(registry.pending_for("bob"), 2);

    // The outbox is closed, so nothing more can be pushed onto it.
    assert!(c2.outbox.send(outbound("bob", "late")).is_err());
    assert_eq!(registry.release(c2.id, &mut c2.rx, Vec::new()), None);

    let c3 = TestConn::new(3);
    let drained = registry.login("bob", c3.id, c3.outbox.clone()).unwrap();
    let texts: Vec<_> = drained.iter().map(|d| d.text.as_str()).collect();
    assert_eq!(texts, ["unsent", "buffered"]);
}

#[test]
fn test_requeue_front_drops_messages_for_deleted_users() {
    let registry = SessionRegistry::new();
    registry.requeue_front(vec![OutboundMessage {
        recipient: "ghost".to_string(),
        delivery: Delivery {
            from: "alice".to_string(),
            text: "boo".to_string(),
            timestamp: 0,
        },
    }]);
    assert_eq!(registry.stats(), RegistryStats::default());
    registry.check_consistency().unwrap();
}

#[test]
fn test_concrete_scenario() {
    let registry = registry_with(&["alice", "bob"]);
    let c1 = TestConn::new(1);
    let c2 = TestConn::new(2);

    c1.login(&registry, "alice");
    assert_eq!(
        registry.route(c1.id, "bob", "hello").unwrap(),
        RouteOutcome::Queued { depth: 1 }
    );

    let drained = registry.login("bob", c2.id, c2.outbox.clone()).unwrap();
    assert_eq!(drained.len(), 1);
    assert_eq!(drained[0].from, "alice");
    assert_eq!(drained[0].text, "hello");

    assert!(registry.list_users().iter().all(|u| u.online));
    assert_eq!(
        registry.stats(),
        RegistryStats {
            registered: 2,
            online: 2,
            queued: 0,
        }
    );
}
