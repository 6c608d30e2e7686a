//! Settings persistence/validation and secret-store roundtrips against a
//! real Postgres instance (the unit tests in `secrets.rs` only exercise the
//! cipher in isolation, since `SecretStore::new` needs a live pool).

mod common;

use test_context::test_context;
use transfer_core::domains::transfer::settings_service::{NamingPatch, SettingsPatch};
use transfer_core::domains::transfer::SettingsService;

use common::TestHarness;

#[test_context(TestHarness)]
#[tokio::test]
async fn get_settings_initializes_defaults_on_first_call(ctx: &TestHarness) {
    let service = SettingsService::new(ctx.db_pool.clone());
    let settings = service.get_settings().await.unwrap();
    assert_eq!(settings.concurrency, 2);
    assert_eq!(settings.retry.max_attempts, 3);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn save_settings_persists_across_instances(ctx: &TestHarness) {
    let service = SettingsService::new(ctx.db_pool.clone());
    let patch = SettingsPatch {
        concurrency: Some(5),
        ..Default::default()
    };
    let (saved, errors) = service.save_settings(patch).await.unwrap();
    assert!(errors.is_empty());
    assert_eq!(saved.concurrency, 5);

    let reloaded = SettingsService::new(ctx.db_pool.clone())
        .get_settings()
        .await
        .unwrap();
    assert_eq!(reloaded.concurrency, 5);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn save_settings_rejects_invalid_patch_without_persisting(ctx: &TestHarness) {
    let service = SettingsService::new(ctx.db_pool.clone());
    let before = service.get_settings().await.unwrap();

    let patch = SettingsPatch {
        naming: Some(NamingPatch {
            title_template: Some("{not_a_real_field}".to_string()),
            description_template: None,
        }),
        ..Default::default()
    };
    let (current, errors) = service.save_settings(patch).await.unwrap();
    assert!(errors.contains_key("naming.title_template"));
    assert_eq!(current.naming.title_template, before.naming.title_template);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn secret_store_roundtrips_credentials_through_postgres(ctx: &TestHarness) {
    ctx.secrets.put("coros", "user@example.com", "hunter2").await.unwrap();
    let (email, password) = ctx.secrets.get("coros").await.unwrap().unwrap();
    assert_eq!(email, "user@example.com");
    assert_eq!(password, "hunter2");

    assert!(ctx.secrets.get("garmin").await.unwrap().is_none());
}
