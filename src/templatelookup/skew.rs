//! Version-skew guard.
//!
//! Compares a freshly resolved template against the last applied state
//! recorded in the tenant status:
//!
//! - **Channel skew**: the tenant moved the module to another channel. The
//!   versions are compared and a move to a lower version is rejected. Equal
//!   versions are allowed.
//! - **Generation skew**: same channel, new template content. Always allowed;
//!   the module is reported outdated so it gets re-applied.

use std::cmp::Ordering;

use semver::Version;
use tracing::{error, info};

use super::{LookupError, UpdateBlockCause};
use crate::api::{ModuleStatus, ModuleTemplate};
use crate::descriptor::DescriptorCache;

/// Decide whether `template` may replace what `status` recorded.
///
/// Returns `Ok(true)` when the installation is outdated and must be
/// re-applied, `Ok(false)` when nothing changed, and
/// [`LookupError::TemplateUpdateNotAllowed`] when the change is a downgrade
/// or the versions cannot be compared.
pub fn check_update_allowed(
    template: &ModuleTemplate,
    desired_channel: &str,
    status: &ModuleStatus,
    descriptors: &DescriptorCache,
) -> Result<bool, LookupError> {
    let Some(tracked) = status.template.as_ref() else {
        return Ok(false);
    };

    let new_channel = template.spec.channel.as_str();
    let new_generation = template.generation();

    if new_channel != status.channel {
        info!(
            module = %status.fqdn,
            template = %template.namespaced_name(),
            desired_channel = %desired_channel,
            new_channel = %new_channel,
            previous_channel = %status.channel,
            "Outdated module template: channel skew"
        );

        let descriptor = descriptors.get(template).map_err(|e| {
            update_not_allowed(
                status,
                UpdateBlockCause::Descriptor,
                format!("could not handle channel skew as descriptor from template cannot be fetched: {e}"),
            )
        })?;
        let new_version = parse_version(&descriptor.version).map_err(|e| {
            update_not_allowed(
                status,
                UpdateBlockCause::InvalidVersion,
                format!("could not handle channel skew as descriptor from template contains invalid version: {e}"),
            )
        })?;
        let previous_version = parse_version(&status.version).map_err(|e| {
            update_not_allowed(
                status,
                UpdateBlockCause::InvalidVersion,
                format!("could not handle channel skew as module status contains invalid version: {e}"),
            )
        })?;

        if !is_valid_version_change(&new_version, &previous_version) {
            let reason = format!(
                "ignore channel skew (from {} to {}), as a higher version ({}) of the module was previously installed",
                status.channel, new_channel, previous_version
            );
            info!(
                module = %status.fqdn,
                new_version = %new_version,
                previous_version = %previous_version,
                "{}", reason
            );
            return Err(LookupError::TemplateUpdateNotAllowed {
                reason,
                cause: UpdateBlockCause::Downgrade,
            });
        }
        return Ok(true);
    }

    if new_generation != tracked.generation {
        info!(
            module = %status.fqdn,
            template = %template.namespaced_name(),
            new_generation = new_generation,
            previous_generation = tracked.generation,
            "Outdated module template: generation skew"
        );
        return Ok(true);
    }

    Ok(false)
}

fn update_not_allowed(
    status: &ModuleStatus,
    cause: UpdateBlockCause,
    reason: String,
) -> LookupError {
    error!(module = %status.fqdn, cause = ?cause, reason = %reason, "Version skew check failed");
    LookupError::TemplateUpdateNotAllowed { reason, cause }
}

/// A version change is valid unless it lowers the version.
///
/// Build metadata does not take part in the comparison.
pub fn is_valid_version_change(new: &Version, previous: &Version) -> bool {
    compare_precedence(new, previous) != Ordering::Less
}

fn compare_precedence(a: &Version, b: &Version) -> Ordering {
    (a.major, a.minor, a.patch, &a.pre).cmp(&(b.major, b.minor, b.patch, &b.pre))
}

/// Parse a version, tolerating a leading `v` and missing minor/patch parts.
///
/// `v1.2` parses as `1.2.0`; `1` as `1.0.0`. Anything else must be valid
/// semver.
pub fn parse_version(raw: &str) -> Result<Version, semver::Error> {
    let trimmed = raw.trim();
    let unprefixed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);

    let core_end = unprefixed
        .find(|c| c == '-' || c == '+')
        .unwrap_or(unprefixed.len());
    let (core, suffix) = unprefixed.split_at(core_end);

    let padded = match core.matches('.').count() {
        0 => format!("{core}.0.0{suffix}"),
        1 => format!("{core}.0{suffix}"),
        _ => unprefixed.to_string(),
    };
    Version::parse(&padded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ModuleTemplateSpec, TrackingObject};
    use crate::templatelookup::ErrorKind;
    use proptest::prelude::*;
    use serde_json::json;

    fn template(channel: &str, version: &str, generation: i64) -> ModuleTemplate {
        let mut t = ModuleTemplate::new(
            &format!("keda-{channel}"),
            ModuleTemplateSpec {
                channel: channel.to_string(),
                descriptor: json!({"component": {"name": "fleet/keda", "version": version}}),
                ..Default::default()
            },
        );
        t.metadata.namespace = Some("kcp-system".to_string());
        t.metadata.generation = Some(generation);
        t
    }

    fn status(channel: &str, version: &str, generation: i64) -> ModuleStatus {
        ModuleStatus {
            name: "keda".to_string(),
            fqdn: "fleet/keda".to_string(),
            channel: channel.to_string(),
            version: version.to_string(),
            template: Some(TrackingObject {
                name: format!("keda-{channel}"),
                namespace: "kcp-system".to_string(),
                generation,
            }),
            state: None,
        }
    }

    #[test]
    fn test_unchanged_is_not_outdated() {
        let cache = DescriptorCache::new();
        let outdated = check_update_allowed(
            &template("regular", "1.0.0", 1),
            "regular",
            &status("regular", "1.0.0", 1),
            &cache,
        )
        .unwrap();
        assert!(!outdated);
    }

    #[test]
    fn test_generation_bump_is_outdated() {
        let cache = DescriptorCache::new();
        let outdated = check_update_allowed(
            &template("regular", "1.0.0", 2),
            "regular",
            &status("regular", "1.0.0", 1),
            &cache,
        )
        .unwrap();
        assert!(outdated);
    }

    #[test]
    fn test_channel_downgrade_is_rejected() {
        let cache = DescriptorCache::new();
        let err = check_update_allowed(
            &template("fast", "0.9.0", 1),
            "fast",
            &status("regular", "1.0.0", 1),
            &cache,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            LookupError::TemplateUpdateNotAllowed {
                cause: UpdateBlockCause::Downgrade,
                ..
            }
        ));
        assert_eq!(err.kind(), ErrorKind::PolicyViolation);
        assert!(err.to_string().contains("from regular to fast"));
    }

    #[test]
    fn test_channel_upgrade_and_tie_are_allowed() {
        let cache = DescriptorCache::new();
        assert!(check_update_allowed(
            &template("fast", "1.1.0", 1),
            "fast",
            &status("regular", "1.0.0", 1),
            &cache,
        )
        .unwrap());
        assert!(check_update_allowed(
            &template("fast", "1.0.0", 7),
            "fast",
            &status("regular", "1.0.0", 1),
            &cache,
        )
        .unwrap());
    }

    #[test]
    fn test_channel_skew_fails_closed_on_bad_versions() {
        let cache = DescriptorCache::new();
        let bad_template = check_update_allowed(
            &template("fast", "not-a-version", 1),
            "fast",
            &status("regular", "1.0.0", 1),
            &cache,
        );
        let bad_template = bad_template.unwrap_err();
        assert!(matches!(
            bad_template,
            LookupError::TemplateUpdateNotAllowed {
                cause: UpdateBlockCause::InvalidVersion,
                ..
            }
        ));
        assert_eq!(bad_template.kind(), ErrorKind::Authoring);
        assert_eq!(bad_template.reason(), "TemplateVersionInvalid");

        let bad_status = check_update_allowed(
            &template("fast", "1.0.0", 1),
            "fast",
            &status("regular", "", 1),
            &cache,
        );
        assert!(matches!(
            bad_status,
            Err(LookupError::TemplateUpdateNotAllowed {
                cause: UpdateBlockCause::InvalidVersion,
                ..
            })
        ));
    }

    #[test]
    fn test_channel_skew_fails_closed_on_broken_descriptor() {
        let cache = DescriptorCache::new();
        let mut broken = template("fast", "1.0.0", 1);
        broken.spec.descriptor = serde_json::Value::Null;

        let err = check_update_allowed(&broken, "fast", &status("regular", "1.0.0", 1), &cache)
            .unwrap_err();
        assert!(matches!(
            err,
            LookupError::TemplateUpdateNotAllowed {
                cause: UpdateBlockCause::Descriptor,
                ..
            }
        ));
        assert_eq!(err.kind(), ErrorKind::Authoring);
    }

    #[test]
    fn test_bad_version_ignored_without_channel_skew() {
        let cache = DescriptorCache::new();
        let outdated = check_update_allowed(
            &template("regular", "garbage", 2),
            "regular",
            &status("regular", "also-garbage", 1),
            &cache,
        )
        .unwrap();
        assert!(outdated);
    }

    #[test]
    fn test_broken_version_is_distinguished_from_downgrade() {
        let cache = DescriptorCache::new();
        let broken = check_update_allowed(
            &template("fast", "not-a-version", 1),
            "fast",
            &status("regular", "1.0.0", 1),
            &cache,
        )
        .unwrap_err();
        let downgrade = check_update_allowed(
            &template("fast", "0.9.0", 1),
            "fast",
            &status("regular", "1.0.0", 1),
            &cache,
        )
        .unwrap_err();

        assert_ne!(broken.kind(), downgrade.kind());
        assert_ne!(broken.reason(), downgrade.reason());
    }

    #[test]
    fn test_status_without_tracking_record() {
        let cache = DescriptorCache::new();
        let mut recorded = status("regular", "2.0.0", 1);
        recorded.template = None;

        let outdated =
            check_update_allowed(&template("fast", "1.0.0", 1), "fast", &recorded, &cache).unwrap();
        assert!(!outdated);
    }

    #[test]
    fn test_parse_version_is_lenient() {
        assert_eq!(parse_version("v1.2.3").unwrap(), Version::new(1, 2, 3));
        assert_eq!(parse_version("1.2").unwrap(), Version::new(1, 2, 0));
        assert_eq!(parse_version("2").unwrap(), Version::new(2, 0, 0));
        assert_eq!(
            parse_version("1.2-rc.1").unwrap(),
            Version::parse("1.2.0-rc.1").unwrap()
        );
        assert!(parse_version("").is_err());
        assert!(parse_version("one.two").is_err());
    }

    #[test]
    fn test_prerelease_and_build_ordering() {
        let release = Version::parse("1.0.0").unwrap();
        let rc = Version::parse("1.0.0-rc.1").unwrap();
        let with_build = Version::parse("1.0.0+build.5").unwrap();

        assert!(!is_valid_version_change(&rc, &release));
        assert!(is_valid_version_change(&release, &rc));
        assert!(is_valid_version_change(&with_build, &release));
        assert!(is_valid_version_change(&release, &with_build));
    }

    proptest! {
        #[test]
        fn prop_no_silent_downgrade(
            old in (0u64..20, 0u64..20, 0u64..20),
            new in (0u64..20, 0u64..20, 0u64..20),
        ) {
            let cache = DescriptorCache::new();
            let old_version = format!("{}.{}.{}", old.0, old.1, old.2);
            let new_version = format!("{}.{}.{}", new.0, new.1, new.2);

            let result = check_update_allowed(
                &template("fast", &new_version, 1),
                "fast",
                &status("regular", &old_version, 1),
                &cache,
            );

            if new < old {
                let blocked = matches!(
                    result,
                    Err(LookupError::TemplateUpdateNotAllowed {
                        cause: UpdateBlockCause::Downgrade,
                        ..
                    })
                );
                prop_assert!(blocked, "downgrade from {} to {} was not blocked", old_version, new_version);
            } else {
                let allowed = matches!(result, Ok(true));
                prop_assert!(allowed, "update from {} to {} was not allowed", old_version, new_version);
            }
        }

        #[test]
        fn prop_generation_only_updates_never_blocked(
            version in (0u64..20, 0u64..20, 0u64..20),
            recorded_version in (0u64..20, 0u64..20, 0u64..20),
            old_generation in 0i64..1000,
            new_generation in 0i64..1000,
        ) {
            let cache = DescriptorCache::new();
            let result = check_update_allowed(
                &template("regular", &format!("{}.{}.{}", version.0, version.1, version.2), new_generation),
                "regular",
                &status(
                    "regular",
                    &format!("{}.{}.{}", recorded_version.0, recorded_version.1, recorded_version.2),
                    old_generation,
                ),
                &cache,
            );

            prop_assert_eq!(result.ok(), Some(new_generation != old_generation));
        }
    }
}
