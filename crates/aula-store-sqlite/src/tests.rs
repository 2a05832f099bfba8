//! Integration tests for `SqliteBackend` against an in-memory database.

use std::time::Duration;

use aula_core::{
  event::AuthEventKind,
  principal::AccountStatus,
  provider::{DirectoryStore, IdentityProvider, NewProfile, SnapshotStorage},
  role::Role,
  snapshot::PersistedSnapshot,
};
use chrono::Utc;
use uuid::Uuid;

use crate::{BackendSettings, Error, SqliteBackend};

async fn backend() -> SqliteBackend {
  SqliteBackend::open_in_memory()
    .await
    .expect("in-memory backend")
}

async fn seeded() -> (SqliteBackend, Uuid, Uuid) {
  let b = backend().await;
  let admin = b
    .register_user("root@example.edu", "admin-pass", Some("Root"), &[Role::admin()])
    .await
    .unwrap();
  let teacher = b
    .register_user("ana@example.edu", "teacher-pass", Some("Ana Ruiz"), &[Role::teacher()])
    .await
    .unwrap();
  (b, admin.id, teacher.id)
}

fn tags(rows: &[aula_core::provider::RoleAssignment]) -> Vec<&str> {
  rows.iter().map(|r| r.role.as_str()).collect()
}

// ─── Identity ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn sign_in_with_correct_password() {
  let (b, _, teacher) = seeded().await;
  let mut events = b.subscribe();

  let session = b
    .sign_in_with_password("ANA@example.edu ", "teacher-pass")
    .await
    .unwrap();
  assert_eq!(session.user.id, teacher);
  assert!(session.expires_at > Utc::now());

  let event = events.try_recv().unwrap();
  assert_eq!(event.kind, AuthEventKind::SignedIn);
  assert_eq!(event.session.map(|u| u.id), Some(teacher));

  let current = b.current_session().await.unwrap().unwrap();
  assert_eq!(current.access_token, session.access_token);
}

#[tokio::test]
async fn bad_credentials_are_rejected() {
  let (b, ..) = seeded().await;
  assert!(matches!(
    b.sign_in_with_password("ana@example.edu", "nope").await,
    Err(Error::InvalidCredentials)
  ));
  assert!(matches!(
    b.sign_in_with_password("ghost@example.edu", "teacher-pass").await,
    Err(Error::InvalidCredentials)
  ));
  assert!(b.current_session().await.unwrap().is_none());
}

#[tokio::test]
async fn sign_out_is_announced() {
  let (b, ..) = seeded().await;
  b.sign_in_with_password("ana@example.edu", "teacher-pass").await.unwrap();
  let mut events = b.subscribe();

  b.sign_out().await.unwrap();
  assert_eq!(events.try_recv().unwrap().kind, AuthEventKind::SignedOut);
  assert!(b.current_session().await.unwrap().is_none());
}

#[tokio::test]
async fn expired_session_reads_as_signed_out() {
  let b = SqliteBackend::open_in_memory_with(BackendSettings {
    session_ttl: chrono::Duration::zero(),
    ..BackendSettings::default()
  })
  .await
  .unwrap();
  b.register_user("s@example.edu", "pw", None, &[Role::student()])
    .await
    .unwrap();
  b.sign_in_with_password("s@example.edu", "pw").await.unwrap();
  let mut events = b.subscribe();

  assert!(b.current_session().await.unwrap().is_none());
  assert_eq!(events.try_recv().unwrap().kind, AuthEventKind::SignedOut);
}

#[tokio::test]
async fn refresh_reissues_token_silently() {
  let (b, _, teacher) = seeded().await;
  assert!(b.refresh_session().is_none());

  let first = b.sign_in_with_password("ana@example.edu", "teacher-pass").await.unwrap();
  let mut events = b.subscribe();
  let refreshed = b.refresh_session().unwrap();

  assert_ne!(refreshed.access_token, first.access_token);
  assert_eq!(refreshed.user.id, teacher);
  let event = events.try_recv().unwrap();
  assert_eq!(event.kind, AuthEventKind::TokenRefreshed);
}

#[tokio::test(start_paused = true)]
async fn auto_refresh_starts_once() {
  let (b, ..) = seeded().await;
  b.sign_in_with_password("ana@example.edu", "teacher-pass").await.unwrap();
  let mut events = b.subscribe();

  assert!(b.enable_auto_refresh(Duration::from_secs(3000)));
  assert!(!b.enable_auto_refresh(Duration::from_secs(1)));

  let event = events.recv().await.unwrap();
  assert_eq!(event.kind, AuthEventKind::TokenRefreshed);
  b.disable_auto_refresh();
}

#[tokio::test]
async fn update_password_needs_a_session() {
  let (b, ..) = seeded().await;
  assert!(matches!(b.update_password("new").await, Err(Error::NoSession)));

  b.sign_in_with_password("ana@example.edu", "teacher-pass").await.unwrap();
  b.update_password("new-pass").await.unwrap();
  b.sign_out().await.unwrap();

  assert!(b.sign_in_with_password("ana@example.edu", "teacher-pass").await.is_err());
  b.sign_in_with_password("ana@example.edu", "new-pass").await.unwrap();
}

#[tokio::test]
async fn reset_token_is_single_use() {
  let (b, _, teacher) = seeded().await;
  assert!(b.issue_reset_token("ghost@example.edu").await.unwrap().is_none());
  b.request_password_reset("ghost@example.edu").await.unwrap();

  let token = b.issue_reset_token("ana@example.edu").await.unwrap().unwrap();
  let mut events = b.subscribe();
  assert_eq!(b.complete_password_reset(&token, "fresh").await.unwrap(), teacher);
  assert_eq!(events.try_recv().unwrap().kind, AuthEventKind::PasswordRecovery);

  assert!(matches!(
    b.complete_password_reset(&token, "again").await,
    Err(Error::InvalidResetToken)
  ));
  assert!(matches!(
    b.complete_password_reset("forged", "again").await,
    Err(Error::InvalidResetToken)
  ));
  b.sign_in_with_password("ana@example.edu", "fresh").await.unwrap();
}

#[tokio::test]
async fn sign_up_creates_an_active_profile_without_roles() {
  let b = backend().await;
  let user = b
    .sign_up("new@example.edu", "first-pass", Some("Nuevo"))
    .await
    .unwrap();
  assert!(b.current_session().await.unwrap().is_none());

  let profile = b.fetch_profile(user.id).await.unwrap().unwrap();
  assert_eq!(profile.status, AccountStatus::Active);
  assert_eq!(profile.display_name.as_deref(), Some("Nuevo"));
  assert!(b.fetch_role_assignments(user.id).await.unwrap().is_empty());

  assert!(matches!(
    b.sign_up("NEW@example.edu", "other", None).await,
    Err(Error::EmailTaken(_))
  ));
  b.sign_in_with_password("new@example.edu", "first-pass").await.unwrap();
}

// ─── Directory reads ─────────────────────────────────────────────────────────

#[tokio::test]
async fn fetch_profile_and_roles() {
  let (b, _, teacher) = seeded().await;

  let profile = b.fetch_profile(teacher).await.unwrap().unwrap();
  assert_eq!(profile.email, "ana@example.edu");
  assert_eq!(profile.display_name.as_deref(), Some("Ana Ruiz"));
  assert_eq!(profile.status, AccountStatus::Active);

  let rows = b.fetch_role_assignments(teacher).await.unwrap();
  assert_eq!(tags(&rows), ["teacher"]);

  assert!(b.fetch_profile(Uuid::new_v4()).await.unwrap().is_none());
  assert!(b.fetch_role_assignments(Uuid::new_v4()).await.unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_email_is_rejected() {
  let (b, ..) = seeded().await;
  assert!(matches!(
    b.register_user("Ana@Example.edu", "x", None, &[]).await,
    Err(Error::EmailTaken(_))
  ));
}

#[tokio::test]
async fn list_by_role_filters_by_search() {
  let (b, admin, _) = seeded().await;
  b.register_user("beto@example.edu", "pw", Some("Beto Soto"), &[Role::teacher()])
    .await
    .unwrap();
  b.register_user("carla@example.edu", "pw", Some("Carla"), &[Role::student()])
    .await
    .unwrap();

  let teachers = b.list_by_role(&Role::teacher(), None).await.unwrap();
  let names: Vec<_> = teachers.iter().filter_map(|p| p.display_name.as_deref()).collect();
  assert_eq!(names, ["Ana Ruiz", "Beto Soto"]);

  let found = b.list_by_role(&Role::teacher(), Some("SOTO")).await.unwrap();
  assert_eq!(found.len(), 1);
  assert_eq!(found[0].email, "beto@example.edu");

  let admins = b.list_by_role(&Role::admin(), Some("  ")).await.unwrap();
  assert_eq!(admins.iter().map(|p| p.id).collect::<Vec<_>>(), [admin]);
}

// ─── Directory writes ────────────────────────────────────────────────────────

#[tokio::test]
async fn non_admin_writes_are_denied() {
  let (b, _, teacher) = seeded().await;
  let err = b
    .assign_roles(teacher, teacher, &[Role::admin()])
    .await
    .unwrap_err();
  assert!(matches!(err, Error::PermissionDenied { action: "assign roles", .. }));
  assert!(aula_core::Error::from(err).is_permission_denied());

  assert!(matches!(
    b.toggle_dropped(teacher, teacher).await,
    Err(Error::PermissionDenied { .. })
  ));
  assert_eq!(tags(&b.fetch_role_assignments(teacher).await.unwrap()), ["teacher"]);
}

#[tokio::test]
async fn admin_manages_roles() {
  let (b, admin, teacher) = seeded().await;

  b.assign_roles(admin, teacher, &[Role::coordinator(), Role::teacher()])
    .await
    .unwrap();
  assert_eq!(
    tags(&b.fetch_role_assignments(teacher).await.unwrap()),
    ["coordinator", "teacher"]
  );

  b.add_role(admin, teacher, &Role::teacher()).await.unwrap();
  b.add_role(admin, teacher, &Role::admin()).await.unwrap();
  assert_eq!(
    tags(&b.fetch_role_assignments(teacher).await.unwrap()),
    ["coordinator", "teacher", "admin"]
  );

  b.remove_role(admin, teacher, &Role::coordinator()).await.unwrap();
  assert_eq!(
    tags(&b.fetch_role_assignments(teacher).await.unwrap()),
    ["teacher", "admin"]
  );

  assert!(matches!(
    b.assign_roles(admin, Uuid::new_v4(), &[Role::student()]).await,
    Err(Error::PrincipalNotFound(_))
  ));
}

#[tokio::test]
async fn admin_creates_profiles() {
  let (b, admin, teacher) = seeded().await;
  let created = b
    .create_profile(admin, NewProfile {
      email:        "new@example.edu".into(),
      display_name: Some("New".into()),
      status:       AccountStatus::Inactive,
    })
    .await
    .unwrap();
  let stored = b.fetch_profile(created.id).await.unwrap().unwrap();
  assert_eq!(stored.status, AccountStatus::Inactive);

  assert!(matches!(
    b.create_profile(teacher, NewProfile {
      email:        "other@example.edu".into(),
      display_name: None,
      status:       AccountStatus::Active,
    })
    .await,
    Err(Error::PermissionDenied { .. })
  ));
}

#[tokio::test]
async fn status_changes_and_dropped_toggle() {
  let (b, admin, teacher) = seeded().await;

  b.set_status(admin, teacher, AccountStatus::Inactive).await.unwrap();
  assert_eq!(
    b.fetch_profile(teacher).await.unwrap().unwrap().status,
    AccountStatus::Inactive
  );

  assert_eq!(b.toggle_dropped(admin, teacher).await.unwrap(), AccountStatus::Dropped);
  assert_eq!(b.toggle_dropped(admin, teacher).await.unwrap(), AccountStatus::Active);

  assert!(matches!(
    b.set_status(admin, Uuid::new_v4(), AccountStatus::Active).await,
    Err(Error::PrincipalNotFound(_))
  ));
}

#[tokio::test]
async fn changes_to_signed_in_principal_are_announced() {
  let (b, admin, teacher) = seeded().await;
  b.sign_in_with_password("ana@example.edu", "teacher-pass").await.unwrap();
  let mut events = b.subscribe();

  b.add_role(admin, teacher, &Role::coordinator()).await.unwrap();
  let event = events.try_recv().unwrap();
  assert_eq!(event.kind, AuthEventKind::UserUpdated);
  assert_eq!(event.session.map(|u| u.id), Some(teacher));

  // Someone else's change is not announced.
  b.add_role(admin, admin, &Role::teacher()).await.unwrap();
  assert!(events.try_recv().is_err());
}

// ─── Snapshot storage ────────────────────────────────────────────────────────

#[tokio::test]
async fn snapshot_save_load_clear() {
  let b = backend().await;
  assert!(b.load().await.unwrap().is_none());

  let snapshot = PersistedSnapshot {
    user:        None,
    active_role: None,
    saved_at:    Utc::now(),
  };
  b.save(&snapshot).await.unwrap();
  assert_eq!(b.load().await.unwrap(), Some(snapshot.clone()));

  let later = PersistedSnapshot {
    saved_at: snapshot.saved_at + chrono::Duration::seconds(5),
    ..snapshot
  };
  b.save(&later).await.unwrap();
  assert_eq!(b.load().await.unwrap(), Some(later));

  b.clear().await.unwrap();
  assert!(b.load().await.unwrap().is_none());
}
