//! Holds the singleton transfer policy, validates partial updates, and
//! builds per-activity metadata previews.

use std::collections::HashMap;

use serde::Deserialize;
use sqlx::PgPool;

use crate::common::error::TransferError;
use crate::domains::transfer::clients::Activity;
use crate::domains::transfer::sport_codes::default_sport_name;
use crate::domains::transfer::template::{ContextValue, TemplateContext, TemplateRenderer};
use crate::kernel::jobs::settings::{Settings, Visibility, SETTINGS_VERSION};

/// A partial update to `Settings`, as received over HTTP. Every field is
/// optional; absent fields leave the corresponding current value untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsPatch {
    pub concurrency: Option<i32>,
    pub retry: Option<RetryPatch>,
    pub naming: Option<NamingPatch>,
    pub privacy: Option<PrivacyPatch>,
    pub sport_mapping: Option<HashMap<i32, String>>,
    pub gear: Option<GearPatch>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetryPatch {
    pub max_attempts: Option<i32>,
    pub base_delay_seconds: Option<f64>,
    pub max_delay_seconds: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NamingPatch {
    pub title_template: Option<String>,
    pub description_template: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrivacyPatch {
    pub visibility: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GearPatch {
    pub enabled: Option<bool>,
    pub gear_id: Option<Option<String>>,
}

pub struct Preview {
    pub title: String,
    pub description: String,
    pub patch: serde_json::Value,
    pub context: TemplateContext,
}

pub struct SettingsService {
    pool: PgPool,
}

impl SettingsService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_settings(&self) -> Result<Settings, TransferError> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT document FROM transfer_settings WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((document,)) => {
                Ok(serde_json::from_value(document).unwrap_or_else(|_| Settings::default()))
            }
            None => {
                let defaults = Settings::default();
                self.persist(&defaults).await?;
                Ok(defaults)
            }
        }
    }

    async fn persist(&self, settings: &Settings) -> Result<(), TransferError> {
        let document = serde_json::to_value(settings)
            .map_err(|e| TransferError::Validation(format!("settings serialize: {e}")))?;
        sqlx::query(
            r#"
            INSERT INTO transfer_settings (id, document)
            VALUES (1, $1)
            ON CONFLICT (id) DO UPDATE SET document = EXCLUDED.document
            "#,
        )
        .bind(document)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Validate `patch` against the field rules of the policy document. On
    /// success, merges it onto the current settings and persists the
    /// result; on failure, returns the field-path-keyed error map and
    /// commits nothing.
    pub async fn save_settings(
        &self,
        patch: SettingsPatch,
    ) -> Result<(Settings, HashMap<String, String>), TransferError> {
        let errors = validate_patch(&patch);
        if !errors.is_empty() {
            return Ok((self.get_settings().await?, errors));
        }

        let mut current = self.get_settings().await?;
        apply_patch(&mut current, patch);
        current.version = SETTINGS_VERSION;

        self.persist(&current).await?;
        Ok((current, HashMap::new()))
    }

    /// Pure: builds the template context for `activity`, renders title and
    /// description, and assembles the intended post-upload metadata patch.
    /// Never mutates state.
    pub fn preview(&self, activity: &Activity, settings: &Settings) -> Preview {
        let context = build_template_context(activity, settings);

        let title = render_or_fallback(&settings.naming.title_template, &context)
            .unwrap_or_else(|| activity.name.clone().unwrap_or_default());
        let description = render_or_fallback(&settings.naming.description_template, &context)
            .unwrap_or_default();

        let mut patch = serde_json::Map::new();
        if !title.is_empty() {
            patch.insert("activityName".to_string(), serde_json::Value::String(title.clone()));
        }
        if !description.is_empty() {
            patch.insert(
                "description".to_string(),
                serde_json::Value::String(description.clone()),
            );
        }
        if settings.privacy.visibility != Visibility::Default {
            let type_key = match settings.privacy.visibility {
                Visibility::Private => "private",
                Visibility::Public => "public",
                Visibility::Default => unreachable!(),
            };
            patch.insert(
                "privacy".to_string(),
                serde_json::json!({ "typeKey": type_key }),
            );
        }
        if settings.gear.enabled {
            if let Some(gear_id) = &settings.gear.gear_id {
                patch.insert("gear_id".to_string(), serde_json::Value::String(gear_id.clone()));
            }
        }

        Preview {
            title,
            description,
            patch: serde_json::Value::Object(patch),
            context,
        }
    }
}

fn render_or_fallback(template: &str, context: &TemplateContext) -> Option<String> {
    if template.is_empty() {
        return None;
    }
    match TemplateRenderer::new(template) {
        Ok(renderer) => Some(renderer.render(context)),
        Err(e) => {
            tracing::warn!(error = %e, "settings template failed validation at render time");
            None
        }
    }
}

fn build_template_context(activity: &Activity, settings: &Settings) -> TemplateContext {
    let sport = settings
        .sport_mapping
        .get(&activity.sport_code)
        .cloned()
        .unwrap_or_else(|| default_sport_name(activity.sport_code).to_string());

    let start = activity
        .start_time
        .as_deref()
        .and_then(crate::domains::transfer::duplicate_probe::DuplicateProbe::parse_start_time);

    let mut ctx = TemplateContext::new();
    ctx.insert("label_id", ContextValue::Str(activity.source_id.clone()));
    ctx.insert("sport", ContextValue::Str(sport));
    ctx.insert("sport_type", ContextValue::Int(activity.sport_code as i64));
    ctx.insert("start_time", ContextValue::DateTime(start));
    ctx.insert("start_local", ContextValue::DateTime(start));
    ctx.insert("duration_seconds", ContextValue::Int(0));
    ctx.insert("duration_formatted", ContextValue::Str("0:00".to_string()));
    ctx.insert("distance_km", ContextValue::Float(0.0));
    ctx.insert("distance_m", ContextValue::Int(0));
    ctx.insert("name", ContextValue::Str(activity.name.clone().unwrap_or_default()));
    ctx.insert("calories", ContextValue::Int(0));
    ctx
}

fn validate_patch(patch: &SettingsPatch) -> HashMap<String, String> {
    let mut errors = HashMap::new();

    if let Some(n) = patch.concurrency {
        if !(1..=10).contains(&n) {
            errors.insert("concurrency".to_string(), "must be an integer between 1 and 10".to_string());
        }
    }

    if let Some(retry) = &patch.retry {
        if let Some(n) = retry.max_attempts {
            if !(1..=10).contains(&n) {
                errors.insert(
                    "retry.max_attempts".to_string(),
                    "must be an integer between 1 and 10".to_string(),
                );
            }
        }
        if let Some(x) = retry.base_delay_seconds {
            if !(0.0..=60.0).contains(&x) {
                errors.insert(
                    "retry.base_delay_seconds".to_string(),
                    "must be a number between 0 and 60".to_string(),
                );
            }
        }
        if let Some(x) = retry.max_delay_seconds {
            if !(1.0..=300.0).contains(&x) {
                errors.insert(
                    "retry.max_delay_seconds".to_string(),
                    "must be a number between 1 and 300".to_string(),
                );
            }
        }
    }

    if let Some(naming) = &patch.naming {
        if let Some(title) = &naming.title_template {
            validate_template_field(title, 200, "naming.title_template", &mut errors);
        }
        if let Some(desc) = &naming.description_template {
            validate_template_field(desc, 1000, "naming.description_template", &mut errors);
        }
    }

    if let Some(privacy) = &patch.privacy {
        if let Some(v) = &privacy.visibility {
            if !matches!(v.as_str(), "default" | "private" | "public") {
                errors.insert(
                    "privacy.visibility".to_string(),
                    "must be one of: default, private, public".to_string(),
                );
            }
        }
    }

    errors
}

fn validate_template_field(
    value: &str,
    max_len: usize,
    field: &str,
    errors: &mut HashMap<String, String>,
) {
    if value.len() > max_len {
        errors.insert(field.to_string(), format!("must be at most {max_len} characters"));
        return;
    }
    if let Err(e) = TemplateRenderer::new(value) {
        errors.insert(field.to_string(), e.to_string());
    }
}

fn apply_patch(current: &mut Settings, patch: SettingsPatch) {
    if let Some(n) = patch.concurrency {
        current.concurrency = n;
    }
    if let Some(retry) = patch.retry {
        if let Some(n) = retry.max_attempts {
            current.retry.max_attempts = n;
        }
        if let Some(x) = retry.base_delay_seconds {
            current.retry.base_delay_seconds = x;
        }
        if let Some(x) = retry.max_delay_seconds {
            current.retry.max_delay_seconds = x;
        }
    }
    if let Some(naming) = patch.naming {
        if let Some(t) = naming.title_template {
            current.naming.title_template = t;
        }
        if let Some(t) = naming.description_template {
            current.naming.description_template = t;
        }
    }
    if let Some(privacy) = patch.privacy {
        if let Some(v) = privacy.visibility {
            current.privacy.visibility = match v.as_str() {
                "private" => Visibility::Private,
                "public" => Visibility::Public,
                _ => Visibility::Default,
            };
        }
    }
    if let Some(mapping) = patch.sport_mapping {
        current.sport_mapping = mapping;
    }
    if let Some(gear) = patch.gear {
        if let Some(enabled) = gear.enabled {
            current.gear.enabled = enabled;
        }
        if let Some(gear_id) = gear.gear_id {
            current.gear.gear_id = gear_id;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_activity() -> Activity {
        Activity {
            source_id: "abc123".to_string(),
            sport_code: 100,
            name: Some("Morning Run".to_string()),
            start_time: Some("2024-01-15 08:30:00".to_string()),
        }
    }

    #[test]
    fn validate_patch_rejects_out_of_range_concurrency() {
        let patch = SettingsPatch {
            concurrency: Some(20),
            ..Default::default()
        };
        let errors = validate_patch(&patch);
        assert!(errors.contains_key("concurrency"));
    }

    #[test]
    fn validate_patch_rejects_unknown_template_variable() {
        let patch = SettingsPatch {
            naming: Some(NamingPatch {
                title_template: Some("{bogus}".to_string()),
                description_template: None,
            }),
            ..Default::default()
        };
        let errors = validate_patch(&patch);
        assert!(errors.contains_key("naming.title_template"));
    }

    #[test]
    fn validate_patch_accepts_default_settings_fields() {
        let settings = Settings::default();
        let patch = SettingsPatch {
            concurrency: Some(settings.concurrency),
            naming: Some(NamingPatch {
                title_template: Some(settings.naming.title_template.clone()),
                description_template: Some(settings.naming.description_template.clone()),
            }),
            ..Default::default()
        };
        assert!(validate_patch(&patch).is_empty());
    }

    #[test]
    fn apply_patch_merges_only_provided_fields() {
        let mut current = Settings::default();
        let original_retry = current.retry.clone();
        apply_patch(&mut current, SettingsPatch { concurrency: Some(5), ..Default::default() });
        assert_eq!(current.concurrency, 5);
        assert_eq!(current.retry.max_attempts, original_retry.max_attempts);
    }

    #[test]
    fn build_template_context_falls_back_to_default_sport_name() {
        let settings = Settings::default();
        let ctx = build_template_context(&sample_activity(), &settings);
        match ctx.get("sport").unwrap() {
            ContextValue::Str(s) => assert_eq!(s, "跑步"),
            _ => panic!("expected Str"),
        }
    }
}
