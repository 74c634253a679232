//! Display formatting for CLI output
//!
//! SBIO pattern: Pure functions that format data for display

use super::commands::ScenarioStep;
use crate::cluster::api::RecoveriesResponse;
use crate::cluster::{ClusterHealth, ClusterStats, Snapshot};
use crate::concepts::Concept;

// ============================================================================
// Table formatting helpers
// ============================================================================

/// Format a simple table with headers and rows
pub fn format_table(headers: &[&str], rows: Vec<Vec<String>>) -> String {
    if rows.is_empty() {
        return "No resources found.\n".to_string();
    }

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let mut output = String::new();
    push_row(&mut output, headers.iter().map(|h| h.to_uppercase()), &widths);
    for row in rows {
        push_row(&mut output, row.into_iter(), &widths);
    }
    output
}

fn push_row(output: &mut String, cells: impl Iterator<Item = String>, widths: &[usize]) {
    let mut line = String::new();
    for (i, cell) in cells.enumerate() {
        if i > 0 {
            line.push_str("   ");
        }
        match widths.get(i) {
            Some(&width) => line.push_str(&format!("{:width$}", cell, width = width)),
            None => line.push_str(&cell),
        }
    }
    output.push_str(line.trim_end());
    output.push('\n');
}

// ============================================================================
// Cluster display
// ============================================================================

/// One-line dashboard summary
pub fn format_stats(stats: &ClusterStats) -> String {
    let health = match stats.health {
        ClusterHealth::Healthy => "Healthy",
        ClusterHealth::Degraded => "Degraded",
    };
    let mut line = format!(
        "Status: {}   Ships: {}/{} ready   Containers: {}   Free slots: {}",
        health, stats.ready_nodes, stats.total_nodes, stats.total_pods, stats.free_slots
    );
    if stats.dropped_pods > 0 {
        line.push_str(&format!("   Lost: {}", stats.dropped_pods));
    }
    line.push('\n');
    line
}

/// Node list with fill levels
pub fn format_nodes(snapshot: &Snapshot) -> String {
    let headers = &["ID", "NAME", "STATUS", "PODS"];
    let rows = snapshot
        .nodes
        .iter()
        .map(|n| {
            vec![
                n.id.to_string(),
                n.name.clone(),
                format!("{:?}", n.status),
                format!("{}/{}", n.pod_count(), n.capacity),
            ]
        })
        .collect();
    format_table(headers, rows)
}

/// Pod list with the ship each one sits on
pub fn format_pods(snapshot: &Snapshot) -> String {
    let headers = &["ID", "NAME", "STATUS", "NODE"];
    let rows = snapshot
        .nodes
        .iter()
        .flat_map(|n| {
            n.pods.iter().map(move |p| {
                vec![
                    p.id.to_string(),
                    p.name.clone(),
                    format!("{:?}", p.status),
                    n.id.to_string(),
                ]
            })
        })
        .collect();
    format_table(headers, rows)
}

/// Summary line plus node table
pub fn format_snapshot(snapshot: &Snapshot) -> String {
    format!(
        "[v{} t={}ms] {}{}",
        snapshot.version,
        snapshot.clock_ms,
        format_stats(&snapshot.stats),
        format_nodes(snapshot)
    )
}

// ============================================================================
// Recovery display
// ============================================================================

pub fn format_recoveries(recoveries: &RecoveriesResponse) -> String {
    let mut output = String::new();

    output.push_str("Queued:\n");
    let rows = recoveries
        .pending
        .iter()
        .map(|p| {
            vec![
                p.task.node_id.to_string(),
                format!("{}ms", p.task.crashed_at_ms),
                format!("{}ms", p.fire_at_ms),
            ]
        })
        .collect();
    output.push_str(&format_table(&["NODE", "CRASHED", "FIRES"], rows));

    output.push_str("\nCompleted:\n");
    let rows = recoveries
        .history
        .iter()
        .map(|r| {
            let dropped = r
                .dropped
                .iter()
                .map(|p| p.id.to_string())
                .collect::<Vec<_>>()
                .join(",");
            vec![
                r.node_id.to_string(),
                format!("{}ms", r.fired_at_ms),
                r.placements.len().to_string(),
                if dropped.is_empty() { "-".to_string() } else { dropped },
            ]
        })
        .collect();
    output.push_str(&format_table(&["NODE", "FIRED", "PLACED", "DROPPED"], rows));

    output
}

// ============================================================================
// Scenario display
// ============================================================================

pub fn format_scenario_step(index: usize, step: &ScenarioStep) -> String {
    format!(
        "Step {}: {} -> {}\n{}",
        index + 1,
        step.action,
        step.outcome,
        format_snapshot(&step.snapshot)
    )
}

// ============================================================================
// Concept display
// ============================================================================

pub fn format_concepts(concepts: &[Concept]) -> String {
    let headers = &["ID", "CONCEPT", "ANALOGY"];
    let rows = concepts
        .iter()
        .map(|c| vec![c.id.to_string(), c.title.to_string(), c.analogy.to_string()])
        .collect();
    format_table(headers, rows)
}
