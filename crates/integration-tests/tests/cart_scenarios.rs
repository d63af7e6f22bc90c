//! Cart scenarios across ownership transitions.

#![allow(clippy::unwrap_used)]

use rust_decimal::Decimal;
use tienda_core::{Category, ProductId, UserId};
use tienda_integration_tests::{TestContext, product, wait_until};
use tienda_storefront::cart::memory::RemoteOp;
use tienda_storefront::cart::{CartError, CartPhase, Outcome, RemoteError, SyncingPolicy};

const ALICE: UserId = UserId::new(100);
const BOB: UserId = UserId::new(200);

fn p(id: i32) -> ProductId {
    ProductId::new(id)
}

fn priced_at_ten() -> TestContext {
    TestContext::with_catalog(
        vec![
            product(1, "Clases de Guitarra", 10, Category::Education),
            product(2, "Soporte Técnico IT", 120, Category::Technology),
        ],
        SyncingPolicy::Queue,
    )
}

// =============================================================================
// Anonymous Cart
// =============================================================================

#[tokio::test]
async fn test_fresh_add_then_increment() {
    let ctx = priced_at_ten();

    let state = ctx.sync.add_item(p(1)).await.unwrap().into_state().unwrap();
    assert_eq!(state.entries().len(), 1);
    assert_eq!(state.get(p(1)).unwrap().quantity, 1);
    assert_eq!(state.subtotal().amount, Decimal::from(10));

    let state = ctx.sync.add_item(p(1)).await.unwrap().into_state().unwrap();
    assert_eq!(state.entries().len(), 1);
    assert_eq!(state.get(p(1)).unwrap().quantity, 2);
    assert_eq!(state.subtotal().amount, Decimal::from(20));
}

#[tokio::test]
async fn test_decrement_to_removal() {
    let ctx = priced_at_ten();
    ctx.sync.add_item(p(1)).await.unwrap();

    ctx.sync.change_quantity(p(1), -1).await.unwrap();

    assert!(ctx.sync.snapshot().is_empty());
    assert_eq!(ctx.local.stored(), Some(Vec::new()));
}

#[tokio::test]
async fn test_change_by_minus_quantity_removes_entry() {
    let ctx = priced_at_ten();
    for _ in 0..3 {
        ctx.sync.add_item(p(2)).await.unwrap();
    }

    ctx.sync.change_quantity(p(2), -3).await.unwrap();
    assert!(ctx.sync.snapshot().get(p(2)).is_none());
}

#[tokio::test]
async fn test_anonymous_checkout_clears_cart() {
    let ctx = priced_at_ten();
    ctx.sync.add_item(p(1)).await.unwrap();
    ctx.sync.add_item(p(2)).await.unwrap();

    let summary = ctx.sync.checkout();
    assert_eq!(summary.lines.len(), 2);
    assert_eq!(summary.total.amount, Decimal::from(130));

    ctx.sync.confirm_purchase().await.unwrap();

    assert!(ctx.sync.snapshot().is_empty());
    assert!(ctx.sync.checkout().is_empty());
    assert_eq!(ctx.local.stored(), Some(Vec::new()));
    assert!(ctx.remote.calls().is_empty());
}

// =============================================================================
// Authenticated Cart
// =============================================================================

#[tokio::test]
async fn test_authenticated_checkout_clears_remote_rows() {
    let ctx = priced_at_ten();
    ctx.remote.seed_row(ALICE, p(1), 2);
    ctx.remote.seed_row(ALICE, p(2), 1);
    ctx.remote.seed_row(BOB, p(2), 5);
    ctx.sync.sign_in(ALICE).await.unwrap();

    assert_eq!(ctx.sync.checkout().lines.len(), 2);
    ctx.sync.confirm_purchase().await.unwrap();

    assert!(ctx.sync.snapshot().is_empty());
    assert!(ctx.remote.rows(ALICE).is_empty());
    assert_eq!(ctx.remote.rows(BOB), vec![(p(2), 5)]);
}

#[tokio::test]
async fn test_failed_checkout_keeps_cart() {
    let ctx = priced_at_ten();
    ctx.remote.seed_row(ALICE, p(1), 2);
    ctx.sync.sign_in(ALICE).await.unwrap();
    ctx.remote.fail(RemoteOp::DeleteAll);

    let err = ctx.sync.confirm_purchase().await.unwrap_err();

    assert!(matches!(err, CartError::Remote(_)));
    assert_eq!(ctx.sync.snapshot().item_count(), 2);
    assert_eq!(ctx.remote.rows(ALICE), vec![(p(1), 2)]);
}

#[tokio::test]
async fn test_sign_in_abandons_anonymous_cart() {
    let ctx = priced_at_ten();
    ctx.sync.add_item(p(2)).await.unwrap();
    ctx.remote.seed_row(ALICE, p(1), 4);

    ctx.sync.sign_in(ALICE).await.unwrap();

    let state = ctx.sync.snapshot();
    assert_eq!(state.phase(), CartPhase::Authenticated(ALICE));
    assert_eq!(state.get(p(1)).unwrap().quantity, 4);
    assert!(state.get(p(2)).is_none());
    assert_eq!(ctx.local.stored(), Some(Vec::new()));
}

#[tokio::test]
async fn test_identity_replacement_leaves_no_residue() {
    let ctx = priced_at_ten();
    ctx.remote.seed_row(ALICE, p(1), 3);
    ctx.remote.seed_row(BOB, p(2), 1);

    ctx.sync.sign_in(ALICE).await.unwrap();
    ctx.sync.add_item(p(2)).await.unwrap();
    ctx.sync.sign_out().await;
    ctx.sync.sign_in(BOB).await.unwrap();

    let state = ctx.sync.snapshot();
    assert_eq!(state.phase(), CartPhase::Authenticated(BOB));
    let entries: Vec<_> = state
        .entries()
        .iter()
        .map(|e| (e.product_id, e.quantity))
        .collect();
    assert_eq!(entries, ctx.remote.rows(BOB));
    assert_eq!(ctx.remote.rows(ALICE), vec![(p(1), 3), (p(2), 1)]);
}

#[tokio::test]
async fn test_sign_in_failure_surfaces_remote_error() {
    let ctx = priced_at_ten();
    ctx.remote.fail(RemoteOp::FetchRows);

    let err = ctx.sync.sign_in(ALICE).await.unwrap_err();

    assert!(matches!(
        err,
        CartError::Remote(RemoteError::Unavailable(_))
    ));
    assert_eq!(ctx.sync.phase(), CartPhase::Anonymous);
    assert!(ctx.sync.snapshot().is_empty());
}

// =============================================================================
// Transitions In Flight
// =============================================================================

#[tokio::test]
async fn test_queued_commands_replay_after_sync() {
    let ctx = TestContext::new(SyncingPolicy::Queue);
    ctx.remote.seed_row(ALICE, p(3), 1);
    ctx.remote.pause(RemoteOp::FetchRows);

    let signing_in = {
        let sync = ctx.sync.clone();
        tokio::spawn(async move { sync.sign_in(ALICE).await })
    };
    wait_until(|| ctx.sync.phase().is_syncing()).await;

    assert_eq!(ctx.sync.add_item(p(3)).await.unwrap(), Outcome::Queued);
    assert_eq!(ctx.sync.add_item(p(5)).await.unwrap(), Outcome::Queued);
    assert_eq!(ctx.sync.pending_len(), 2);

    ctx.remote.resume(RemoteOp::FetchRows);
    signing_in.await.unwrap().unwrap();

    assert_eq!(ctx.sync.pending_len(), 0);
    assert_eq!(ctx.remote.rows(ALICE), vec![(p(3), 2), (p(5), 1)]);
    assert_eq!(ctx.sync.snapshot().item_count(), 3);
}

#[tokio::test]
async fn test_reject_policy_signals_transition_in_progress() {
    let ctx = TestContext::new(SyncingPolicy::Reject);
    ctx.remote.pause(RemoteOp::FetchRows);

    let signing_in = {
        let sync = ctx.sync.clone();
        tokio::spawn(async move { sync.sign_in(ALICE).await })
    };
    wait_until(|| ctx.sync.phase().is_syncing()).await;

    let err = ctx.sync.add_item(p(1)).await.unwrap_err();
    assert!(matches!(err, CartError::TransitionInProgress));

    ctx.remote.resume(RemoteOp::FetchRows);
    signing_in.await.unwrap().unwrap();
    assert!(ctx.sync.snapshot().is_empty());
}

#[tokio::test]
async fn test_stale_fetch_for_previous_user_is_discarded() {
    let ctx = TestContext::new(SyncingPolicy::Queue);
    ctx.remote.seed_row(ALICE, p(1), 1);
    ctx.remote.seed_row(BOB, p(7), 2);
    ctx.remote.pause(RemoteOp::FetchRows);

    let alice = {
        let sync = ctx.sync.clone();
        tokio::spawn(async move { sync.sign_in(ALICE).await })
    };
    wait_until(|| ctx.sync.phase() == CartPhase::Syncing(ALICE)).await;

    let bob = {
        let sync = ctx.sync.clone();
        tokio::spawn(async move { sync.sign_in(BOB).await })
    };
    wait_until(|| ctx.sync.phase() == CartPhase::Syncing(BOB)).await;

    ctx.remote.resume(RemoteOp::FetchRows);
    assert_eq!(alice.await.unwrap().unwrap(), Outcome::Superseded);
    bob.await.unwrap().unwrap();

    let state = ctx.sync.snapshot();
    assert_eq!(state.phase(), CartPhase::Authenticated(BOB));
    assert_eq!(state.get(p(7)).unwrap().quantity, 2);
    assert!(state.get(p(1)).is_none());
}

#[tokio::test]
async fn test_observer_sees_every_transition_in_order() {
    let ctx = priced_at_ten();
    ctx.remote.seed_row(ALICE, p(1), 1);

    ctx.sync.add_item(p(2)).await.unwrap();
    ctx.sync.sign_in(ALICE).await.unwrap();
    ctx.sync.sign_out().await;

    let phases: Vec<_> = ctx.observer.states().iter().map(|s| s.phase()).collect();
    assert_eq!(
        phases,
        vec![
            CartPhase::Anonymous,
            CartPhase::Syncing(ALICE),
            CartPhase::Authenticated(ALICE),
            CartPhase::Anonymous,
        ]
    );
}
