//! End-to-end behavior of the availability pipeline: filter, database
//! fallback, mutation ordering and cache invalidation.

mod common;

use ::common::AppError;
use domain::{Identifier, IdentifierKind, UserRole};
use futures::future::join_all;
use user_service_lib::filter::{FilterStore, Membership, MembershipFilter};
use user_service_lib::service::UserService;

use common::{new_user, Harness};

#[tokio::test]
async fn test_unseen_username_answered_without_database() {
    let harness = Harness::new().await;

    let availability = harness.usernames.check_availability("newcomer").await.unwrap();

    assert!(availability.available);
    assert_eq!(harness.repo.lookups(), 0);
}

#[tokio::test]
async fn test_created_username_is_immediately_taken() {
    let harness = Harness::new().await;
    harness
        .service
        .create_user(new_user("alice", "alice@example.com"))
        .await
        .unwrap();

    assert!(!harness.usernames.check_availability("alice").await.unwrap().available);
    assert!(!harness.usernames.check_availability(" ALICE ").await.unwrap().available);
    assert!(!harness
        .emails
        .check_availability("Alice@Example.com")
        .await
        .unwrap()
        .available);
}

#[tokio::test]
async fn test_existing_record_reported_taken_whatever_the_filter_says() {
    let harness = Harness::new().await;
    harness
        .service
        .create_user(new_user("alice", "alice@example.com"))
        .await
        .unwrap();
    let before = harness.repo.lookups();

    let availability = harness.usernames.check_availability("alice").await.unwrap();

    assert!(!availability.available);
    assert_eq!(harness.repo.lookups(), before + 1);
}

#[tokio::test]
async fn test_deleted_username_stays_in_filter_but_is_available() {
    let harness = Harness::new().await;
    harness
        .service
        .create_user(new_user("bob", "bob@example.com"))
        .await
        .unwrap();
    let bob = Identifier::username("bob").unwrap();
    harness.service.delete_user(&bob).await.unwrap();

    assert_eq!(
        harness.usernames.filter().test(&bob).await.unwrap(),
        Membership::PossiblyPresent
    );

    let before = harness.repo.lookups();
    assert!(harness.usernames.check_availability("bob").await.unwrap().available);
    assert_eq!(harness.repo.lookups(), before + 1);
}

#[tokio::test]
async fn test_listing_reflects_new_record_after_create() {
    let harness = Harness::new().await;
    harness
        .service
        .create_user(new_user("alice", "alice@example.com"))
        .await
        .unwrap();

    let first = harness.service.list_users().await.unwrap();
    assert_eq!(first.len(), 1);

    harness
        .service
        .create_user(new_user("bob", "bob@example.com"))
        .await
        .unwrap();

    let second = harness.service.list_users().await.unwrap();
    let names: Vec<_> = second.iter().map(|u| u.username.as_str()).collect();
    assert_eq!(names, vec!["alice", "bob"]);
}

#[tokio::test]
async fn test_listing_reflects_role_change_and_delete() {
    let harness = Harness::new().await;
    harness
        .service
        .create_user(new_user("alice", "alice@example.com"))
        .await
        .unwrap();
    harness.service.list_users().await.unwrap();

    let alice = Identifier::username("alice").unwrap();
    harness.service.update_role(&alice, UserRole::Admin).await.unwrap();
    assert_eq!(harness.service.list_users().await.unwrap()[0].role, UserRole::Admin);

    harness.service.delete_user(&alice).await.unwrap();
    assert!(harness.service.list_users().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_duplicate_username_and_email_rejected() {
    let harness = Harness::new().await;
    harness
        .service
        .create_user(new_user("alice", "alice@example.com"))
        .await
        .unwrap();

    let same_name = harness
        .service
        .create_user(new_user("Alice", "other@example.com"))
        .await;
    assert!(matches!(same_name, Err(AppError::Conflict(field)) if field == "Username"));

    let same_email = harness
        .service
        .create_user(new_user("alice2", "ALICE@example.com"))
        .await;
    assert!(matches!(same_email, Err(AppError::Conflict(field)) if field == "Email"));

    assert_eq!(harness.repo.len(), 1);
}

#[tokio::test]
async fn test_concurrent_signups_for_one_username_admit_exactly_one() {
    let harness = Harness::new().await;

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let service = harness.service.clone();
            tokio::spawn(async move {
                service
                    .create_user(new_user("carol", &format!("carol{}@example.com", i)))
                    .await
            })
        })
        .collect();

    let mut created = 0;
    for result in join_all(handles).await {
        match result.unwrap() {
            Ok(_) => created += 1,
            Err(AppError::Conflict(_)) => {}
            Err(e) => panic!("unexpected error: {:?}", e),
        }
    }

    assert_eq!(created, 1);
    assert_eq!(harness.repo.len(), 1);
    assert!(!harness.usernames.check_availability("carol").await.unwrap().available);
}

#[tokio::test]
async fn test_missing_filter_fails_closed() {
    let harness = Harness::new().await;
    harness.username_store.clear().await.unwrap();

    assert!(matches!(
        harness.usernames.check_availability("alice").await,
        Err(AppError::FilterUnavailable(_))
    ));
    assert!(matches!(
        harness
            .service
            .create_user(new_user("alice", "alice@example.com"))
            .await,
        Err(AppError::FilterUnavailable(_))
    ));
    assert_eq!(harness.repo.len(), 0);
}

#[tokio::test]
async fn test_initialization_is_idempotent() {
    let harness = Harness::new().await;
    harness
        .service
        .create_user(new_user("alice", "alice@example.com"))
        .await
        .unwrap();

    let again = MembershipFilter::initialize(
        IdentifierKind::Username,
        harness.username_store.clone(),
        &harness.config,
    )
    .await
    .unwrap();

    assert_eq!(again.metadata(), harness.usernames.filter().metadata());
    assert_eq!(
        again.test(&Identifier::username("alice").unwrap()).await.unwrap(),
        Membership::PossiblyPresent
    );
    assert_eq!(harness.username_store.probe().await.unwrap().unwrap().items, 1);
}

#[tokio::test]
async fn test_rebuild_drops_deleted_identifiers() {
    let harness = Harness::new().await;
    for name in ["alice", "bob"] {
        harness
            .service
            .create_user(new_user(name, &format!("{}@example.com", name)))
            .await
            .unwrap();
    }
    harness
        .service
        .delete_user(&Identifier::username("bob").unwrap())
        .await
        .unwrap();

    let remaining: Vec<_> = harness
        .service
        .list_users()
        .await
        .unwrap()
        .into_iter()
        .map(|u| Identifier::username(&u.username).unwrap())
        .collect();
    let rebuilt = MembershipFilter::reprovision(
        IdentifierKind::Username,
        harness.username_store.clone(),
        &harness.config,
        remaining,
    )
    .await
    .unwrap();

    let status = rebuilt.status().await.unwrap();
    assert_eq!(status.items, 1);
    assert_eq!(
        rebuilt.test(&Identifier::username("alice").unwrap()).await.unwrap(),
        Membership::PossiblyPresent
    );

    // Same configuration, same layout: the running service keeps answering.
    assert!(!harness.usernames.check_availability("alice").await.unwrap().available);
}

#[tokio::test]
async fn test_transient_filter_failure_after_commit_is_retried() {
    let harness = Harness::with_failing_username_writes(1).await;

    harness
        .service
        .create_user(new_user("alice", "alice@example.com"))
        .await
        .unwrap();

    assert_eq!(harness.repo.len(), 1);
    assert!(!harness.usernames.check_availability("alice").await.unwrap().available);
}

#[tokio::test]
async fn test_unrecorded_signup_is_rolled_back() {
    // Three attempts per insert, all three time out
    let harness = Harness::with_failing_username_writes(3).await;

    let result = harness
        .service
        .create_user(new_user("alice", "alice@example.com"))
        .await;
    assert!(matches!(result, Err(AppError::FilterUnavailable(_))));

    // Nothing stored, so "available" is the truth
    assert_eq!(harness.repo.len(), 0);
    assert!(harness.usernames.check_availability("alice").await.unwrap().available);

    // The store has recovered; the same signup now goes through
    harness
        .service
        .create_user(new_user("alice", "alice@example.com"))
        .await
        .unwrap();
    assert!(!harness.usernames.check_availability("alice").await.unwrap().available);
}
