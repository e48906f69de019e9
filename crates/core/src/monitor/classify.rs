//! Pure classification of one torrent snapshot.
//!
//! Rules are applied in a fixed order:
//!
//! 0. recheck category
//! 1. tracker policy resolution
//! 2. non-destructive maintenance (dead trackers, per-torrent limits)
//! 3. age gate
//! 4. failed category
//! 5. seeding limits
//! 6. transient states
//! 7. errored / missing files / paused
//! 8. ETA ceiling
//! 9. stall detection
//! 10. file filtering
//! 11. completion handoff
//! 12. healthy

use chrono::{DateTime, Duration, Utc};

use super::tracker::{record_hosts, trackers_to_remove, EffectivePolicy};
use super::{ClassificationDecision, MonitorAction, TransferRecord, Verdict};
use crate::arr::QueueEntry;
use crate::config::{RemoveTorrentPolicy, Settings, TorrentPolicy};
use crate::filter::{FilterEngine, RejectReason};
use crate::torrent_client::{TorrentInfo, TorrentState};

/// Seconds a completed torrent must sit before it is handed to the back-end.
const COMPLETION_SETTLE_SECS: i64 = 60;

/// Everything classification depends on besides the snapshot itself.
pub struct ClassifyContext<'a> {
    pub instance_category: &'a str,
    pub settings: &'a Settings,
    pub policy: &'a TorrentPolicy,
    pub filter: &'a FilterEngine,
    pub re_search: bool,
    pub now: DateTime<Utc>,
}

/// Classify one torrent.
///
/// `queue` is the back-end queue record whose download id matches the
/// torrent hash. `probe_failures` lists files (by client index) that the
/// media probe rejected.
pub fn classify(
    ctx: &ClassifyContext<'_>,
    record: &TransferRecord,
    queue: Option<&QueueEntry>,
    probe_failures: &[(usize, String)],
) -> Verdict {
    use ClassificationDecision::*;

    let info = &record.info;
    let category = info.category.as_deref().unwrap_or_default();

    // 0. Recheck category
    if category == ctx.settings.recheck_category {
        return Verdict::new(RecheckRequested, "torrent placed in recheck category").with_actions([
            MonitorAction::Recheck,
            MonitorAction::SetCategory {
                category: ctx.instance_category.to_string(),
            },
        ]);
    }

    // 1. Tracker policy resolution
    let effective = EffectivePolicy::resolve(ctx.policy, &record_hosts(record));

    // 2. Non-destructive maintenance
    let maintenance = maintenance_actions(ctx, record, &effective);

    // 3. Age gate
    let age = info.added_at.map(|added| ctx.now - added);
    let old_enough = age
        .is_some_and(|age| age >= Duration::seconds(ctx.policy.ignore_torrents_younger_than));
    if !old_enough {
        return Verdict::new(
            TooYoungToJudge,
            format!(
                "added less than {}s ago",
                ctx.policy.ignore_torrents_younger_than
            ),
        )
        .with_actions(maintenance);
    }

    // 4. Failed category
    if category == ctx.settings.failed_category {
        return Verdict::new(BlocklistCandidate, "torrent placed in failed category")
            .with_actions(maintenance)
            .with_actions(removal_actions(ctx, queue));
    }

    // 5. Seeding limits
    let awaiting_import = queue.is_some_and(QueueEntry::awaits_import);
    if info.is_complete() && !awaiting_import {
        if let Some(reason) = seeding_limit_reached(ctx.policy.seeding.remove_torrent, info, &effective)
        {
            return Verdict::new(SeedingLimitReached, reason)
                .with_actions(maintenance)
                .with_actions([MonitorAction::Delete { delete_files: true }]);
        }
    }

    // 6. Transient states
    if info.state.is_transient() {
        return Verdict::new(Healthy, format!("client is busy ({})", info.state))
            .with_actions(maintenance);
    }

    // 7. Errored, missing files, paused
    match info.state {
        TorrentState::Error | TorrentState::MissingFiles => {
            return Verdict::new(Healthy, format!("rechecking after {}", info.state))
                .with_actions(maintenance)
                .with_actions([MonitorAction::Recheck]);
        }
        TorrentState::PausedDownload if !info.is_complete() => {
            return Verdict::new(Healthy, "resuming paused download")
                .with_actions(maintenance)
                .with_actions([MonitorAction::Resume]);
        }
        _ => {}
    }

    let deletable = info.progress < ctx.policy.maximum_deletable_percentage;

    // 8. ETA ceiling
    if !ctx.policy.do_not_remove_slow
        && effective.maximum_eta > 0
        && matches!(info.state, TorrentState::Downloading)
        && deletable
    {
        if let Some(eta) = info.eta_secs {
            if eta > effective.maximum_eta as u64 {
                let shown = if eta == u64::MAX {
                    "infinite".to_string()
                } else {
                    format!("{}s", eta)
                };
                return Verdict::new(
                    BlocklistCandidate,
                    format!("ETA {} exceeds ceiling {}s", shown, effective.maximum_eta),
                )
                .with_actions(maintenance)
                .with_actions(removal_actions(ctx, queue));
            }
        }
    }

    // 9. Stall detection
    if info.state.is_stalled() {
        if deletable {
            return Verdict::new(Stalled, format!("client reports {}", info.state))
                .with_actions(maintenance)
                .with_actions(removal_actions(ctx, queue));
        }
        let inactive_too_long = effective.maximum_eta > 0
            && info.last_activity_at.is_some_and(|last| {
                ctx.now - last > Duration::seconds(effective.maximum_eta)
            });
        if inactive_too_long {
            return Verdict::new(
                Stalled,
                format!(
                    "stalled at {:.1}% with no activity for over {}s",
                    info.progress * 100.0,
                    effective.maximum_eta
                ),
            )
            .with_actions(maintenance)
            .with_actions(removal_actions(ctx, queue));
        }
        return Verdict::new(
            Healthy,
            format!("stalled at {:.1}% but recently active", info.progress * 100.0),
        )
        .with_actions(maintenance);
    }

    // 10. File filtering
    let mut report = ctx.filter.evaluate(&record.files);
    for (index, detail) in probe_failures {
        report.reject(
            *index,
            RejectReason::ProbeFailed {
                detail: detail.clone(),
            },
        );
    }
    if report.any_rejected() {
        let detail = report
            .first_rejection()
            .map(|(name, reason)| format!("{}: {}", name, reason))
            .unwrap_or_default();

        if report.all_rejected() {
            return Verdict::new(BlocklistCandidate, format!("all files rejected ({})", detail))
                .with_actions(maintenance)
                .with_actions(removal_actions(ctx, queue));
        }

        // Skipped files drop out of the next evaluation, so the rest can be imported.
        let mut verdict =
            Verdict::new(FilteredOut, format!("some files rejected ({})", detail))
                .with_actions(maintenance)
                .with_actions([MonitorAction::SkipFiles {
                    indices: report.rejected_indices(),
                }]);
        if ctx.policy.auto_delete {
            verdict.actions.push(MonitorAction::RemoveFiles {
                names: report.rejected_names(),
            });
        }
        return verdict;
    }

    // 11. Completion handoff
    let settled = info
        .completed_at
        .is_some_and(|done| ctx.now - done >= Duration::seconds(COMPLETION_SETTLE_SECS));
    if info.is_complete() && settled {
        let mut verdict = Verdict::new(ImportCandidate, "download complete")
            .with_actions(maintenance);
        if awaiting_import && !record.files.is_empty() {
            if let Some(path) = content_path(info) {
                verdict.reason = "download complete, requesting import".to_string();
                verdict.actions.push(MonitorAction::Import { path });
            }
        }
        return verdict;
    }

    // 12. Healthy
    Verdict::new(Healthy, "downloading normally").with_actions(maintenance)
}

/// Tracker removal and per-torrent limit adjustments.
fn maintenance_actions(
    ctx: &ClassifyContext<'_>,
    record: &TransferRecord,
    effective: &EffectivePolicy,
) -> Vec<MonitorAction> {
    let info = &record.info;
    let mut actions = Vec::new();

    let urls = trackers_to_remove(record, ctx.policy, effective);
    if !urls.is_empty() {
        actions.push(MonitorAction::RemoveTrackers { urls });
    }

    if effective.download_rate_limit >= 0
        && effective.download_rate_limit as u64 != info.download_limit
    {
        actions.push(MonitorAction::SetDownloadLimit {
            limit: effective.download_rate_limit as u64,
        });
    }
    if effective.upload_rate_limit >= 0 && effective.upload_rate_limit as u64 != info.upload_limit
    {
        actions.push(MonitorAction::SetUploadLimit {
            limit: effective.upload_rate_limit as u64,
        });
    }

    if effective.max_upload_ratio >= 0.0 || effective.max_seeding_time >= 0 {
        let ratio = if effective.max_upload_ratio >= 0.0 {
            effective.max_upload_ratio
        } else {
            -1.0
        };
        let seeding_time_mins = if effective.max_seeding_time >= 0 {
            effective.max_seeding_time / 60
        } else {
            -1
        };
        if (ratio - info.ratio_limit).abs() > 0.001
            || seeding_time_mins != info.seeding_time_limit_mins
        {
            actions.push(MonitorAction::SetShareLimits {
                ratio,
                seeding_time_mins,
            });
        }
    }

    actions
}

/// Blacklist (when linked to a queue record), delete with files, optionally research.
fn removal_actions(ctx: &ClassifyContext<'_>, queue: Option<&QueueEntry>) -> Vec<MonitorAction> {
    let mut actions = Vec::new();
    if let Some(entry) = queue {
        actions.push(MonitorAction::Blocklist { queue_id: entry.id });
    }
    actions.push(MonitorAction::Delete { delete_files: true });
    if ctx.re_search {
        if let Some(target) = queue.and_then(QueueEntry::research_target) {
            actions.push(MonitorAction::Research { target });
        }
    }
    actions
}

fn seeding_limit_reached(
    mode: RemoveTorrentPolicy,
    info: &TorrentInfo,
    effective: &EffectivePolicy,
) -> Option<String> {
    let ratio_hit = effective.max_upload_ratio >= 0.0 && info.ratio >= effective.max_upload_ratio;
    let time_hit = effective.max_seeding_time >= 0
        && info.seeding_time_secs as i64 >= effective.max_seeding_time;

    let reached = match mode {
        RemoveTorrentPolicy::Never => false,
        RemoveTorrentPolicy::Ratio => ratio_hit,
        RemoveTorrentPolicy::SeedingTime => time_hit,
        RemoveTorrentPolicy::Either => ratio_hit || time_hit,
        RemoveTorrentPolicy::Both => ratio_hit && time_hit,
    };

    reached.then(|| {
        format!(
            "ratio {:.2} (limit {}), seeded {}s (limit {})",
            info.ratio, effective.max_upload_ratio, info.seeding_time_secs, effective.max_seeding_time
        )
    })
}

fn content_path(info: &TorrentInfo) -> Option<String> {
    info.content_path
        .clone()
        .or_else(|| info.save_path.clone())
        .filter(|p| !p.is_empty())
}
