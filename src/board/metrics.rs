#![forbid(unsafe_code)]

use serde::Serialize;
use time::{Duration, OffsetDateTime};

use crate::config::BoardConfig;
use crate::task::Task;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metrics {
    pub throughput_7d: usize,
    pub throughput_30d: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_lead_time_hours: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_cycle_time_hours: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow_efficiency: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub aging_items: Vec<AgingItem>,
}

/// Work that has started and not finished.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgingItem {
    pub id: u32,
    pub title: String,
    pub status: String,
    pub age_hours: f64,
}

fn hours(d: Duration) -> f64 {
    d.as_seconds_f64() / 3600.0
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

#[must_use]
pub fn compute_metrics(cfg: &BoardConfig, tasks: &[Task], now: OffsetDateTime) -> Metrics {
    let week_ago = now - Duration::days(7);
    let month_ago = now - Duration::days(30);

    let mut m = Metrics::default();
    let mut lead = Vec::new();
    let mut cycle = Vec::new();

    for t in tasks.iter().filter(|t| !t.is_archived()) {
        if let Some(done) = t.completed {
            if done > week_ago {
                m.throughput_7d += 1;
            }
            if done > month_ago {
                m.throughput_30d += 1;
            }
            lead.push(hours(done - t.created));
            if let Some(started) = t.started {
                cycle.push(hours(done - started));
            }
        }
        if let Some(started) = t.started
            && t.completed.is_none()
            && t.status != cfg.terminal_status()
        {
            m.aging_items.push(AgingItem {
                id: t.id,
                title: t.title.clone(),
                status: t.status.clone(),
                age_hours: hours(now - started),
            });
        }
    }

    m.avg_lead_time_hours = mean(&lead);
    m.avg_cycle_time_hours = mean(&cycle);
    m.flow_efficiency = match (m.avg_cycle_time_hours, m.avg_lead_time_hours) {
        (Some(c), Some(l)) if l > 0.0 => Some(c / l),
        _ => None,
    };
    m.aging_items
        .sort_by(|a, b| b.age_hours.total_cmp(&a.age_hours).then(a.id.cmp(&b.id)));
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ARCHIVED_STATUS;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2026-06-15 12:00 UTC);

    fn done(id: u32, created: OffsetDateTime, started: Option<OffsetDateTime>, completed: OffsetDateTime) -> Task {
        let mut t = Task::new(id, format!("Task {id}"), "done", "medium", created);
        t.started = started;
        t.completed = Some(completed);
        t
    }

    #[test]
    fn empty_board_has_no_averages() {
        let m = compute_metrics(&BoardConfig::default(), &[], NOW);
        assert_eq!(m, Metrics::default());
    }

    #[test]
    fn lead_cycle_and_efficiency_average_over_tasks() {
        let tasks: Vec<Task> = [(1, 100, 50), (2, 150, 75), (3, 200, 100)]
            .into_iter()
            .map(|(id, lead, cycle)| {
                done(
                    id,
                    NOW - Duration::hours(lead),
                    Some(NOW - Duration::hours(cycle)),
                    NOW,
                )
            })
            .collect();
        let m = compute_metrics(&BoardConfig::default(), &tasks, NOW);
        assert!((m.avg_lead_time_hours.unwrap() - 150.0).abs() < 1e-9);
        assert!((m.avg_cycle_time_hours.unwrap() - 75.0).abs() < 1e-9);
        assert!((m.flow_efficiency.unwrap() - 0.5).abs() < 1e-9);
        assert_eq!(m.throughput_7d, 3);
    }

    #[test]
    fn throughput_windows_are_exclusive() {
        let long_ago = NOW - Duration::days(60);
        let tasks = vec![
            done(1, long_ago, None, NOW - Duration::days(3)),
            done(2, long_ago, None, NOW - Duration::days(10)),
            done(3, long_ago, None, NOW - Duration::days(60)),
            done(4, long_ago, None, NOW - Duration::days(7)),
        ];
        let m = compute_metrics(&BoardConfig::default(), &tasks, NOW);
        assert_eq!(m.throughput_7d, 1);
        assert_eq!(m.throughput_30d, 3);
        assert_eq!(m.avg_cycle_time_hours, None);
        assert_eq!(m.flow_efficiency, None);
    }

    #[test]
    fn aging_items_oldest_first_and_archived_ignored() {
        let mut a = Task::new(1, "young", "in-progress", "low", NOW - Duration::days(5));
        a.started = Some(NOW - Duration::hours(2));
        let mut b = Task::new(2, "old", "review", "low", NOW - Duration::days(5));
        b.started = Some(NOW - Duration::hours(48));
        let mut c = b.clone();
        c.id = 3;
        c.status = ARCHIVED_STATUS.to_owned();
        let untouched = Task::new(4, "waiting", "todo", "low", NOW);

        let m = compute_metrics(&BoardConfig::default(), &[a, b, c, untouched], NOW);
        let ids: Vec<u32> = m.aging_items.iter().map(|i| i.id).collect();
        assert_eq!(ids, [2, 1]);
        assert!((m.aging_items[0].age_hours - 48.0).abs() < 1e-9);
    }
}
