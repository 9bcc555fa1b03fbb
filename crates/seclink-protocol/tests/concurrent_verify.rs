use std::sync::Arc;
use std::thread;

use seclink_protocol::{
    sign, verify_at, MemberId, MembershipRegistry, MessageBuilder, ReplayGuard,
};

const T0: i64 = 1_700_000_000;

#[test]
fn same_nonce_accepted_by_exactly_one_thread() {
    let registry = Arc::new(MembershipRegistry::with_members(["A", "B"]));
    let guard = Arc::new(ReplayGuard::default());
    let msg = Arc::new(
        sign(
            b"k",
            MessageBuilder::new("A".into(), "B".into(), "race")
                .timestamp(T0)
                .nonce("shared")
                .build(),
            &registry,
        )
        .unwrap(),
    );

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let guard = Arc::clone(&guard);
            let msg = Arc::clone(&msg);
            thread::spawn(move || verify_at(b"k", &msg, &registry, 300, &guard, T0))
        })
        .collect();

    let accepted = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();
    assert_eq!(accepted, 1);
    assert_eq!(guard.len(), 1);
}

#[test]
fn distinct_nonces_all_accepted_concurrently() {
    let registry = Arc::new(MembershipRegistry::with_members(["A", "B"]));
    let guard = Arc::new(ReplayGuard::default());

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let registry = Arc::clone(&registry);
            let guard = Arc::clone(&guard);
            thread::spawn(move || {
                let msg = MessageBuilder::new(MemberId::from("A"), MemberId::from("B"), "p")
                    .timestamp(T0)
                    .nonce(format!("n-{i}"))
                    .sign(b"k", &registry)
                    .unwrap();
                verify_at(b"k", &msg, &registry, 300, &guard, T0)
            })
        })
        .collect();

    assert!(handles.into_iter().all(|h| h.join().unwrap()));
    assert_eq!(guard.len(), 16);
}

#[test]
fn membership_churn_during_verification() {
    let registry = Arc::new(MembershipRegistry::with_members(["A", "B"]));
    let guard = Arc::new(ReplayGuard::default());

    let churn = {
        let registry = Arc::clone(&registry);
        thread::spawn(move || {
            for i in 0..500 {
                registry.add_member(format!("temp-{i}"));
                registry.remove_member(format!("temp-{i}"));
            }
        })
    };

    let verifiers: Vec<_> = (0..8)
        .map(|i| {
            let registry = Arc::clone(&registry);
            let guard = Arc::clone(&guard);
            thread::spawn(move || {
                let msg = MessageBuilder::new("A".into(), "B".into(), "steady")
                    .timestamp(T0)
                    .nonce(format!("churn-{i}"))
                    .sign(b"k", &registry)
                    .unwrap();
                verify_at(b"k", &msg, &registry, 300, &guard, T0)
            })
        })
        .collect();

    churn.join().unwrap();
    assert!(verifiers.into_iter().all(|h| h.join().unwrap()));
}
