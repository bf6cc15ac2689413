// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! CLI output reporter with colored formatting

use crate::matching::{InstanceGroup, MatchStage};
use crate::report::RunReport;
use colored::*;
use std::time::Duration;

/// CLI reporter for formatted output
pub struct Reporter;

impl Reporter {
    /// Summary of an instancing run
    pub fn report_run(scene: &str, report: &RunReport, duration: Duration, verbose: bool) {
        println!("\n{}", "━".repeat(80).bright_black());
        println!("{} {}", "Scene:".bold(), scene.cyan());
        println!("{}", "━".repeat(80).bright_black());

        if report.instances_created > 0 {
            println!(
                "{} {}",
                "✅".green(),
                format!("Created {} instances", report.instances_created).green().bold()
            );
        } else {
            println!("{} {}", "ℹ️".bright_blue(), "No new instances".bold());
        }

        println!("\n{}", "Groups:".bold());
        for group in &report.groups {
            let strategy = group
                .strategy
                .map(|s| format!(" [{s}]"))
                .unwrap_or_default();
            println!(
                "  {} {} {}{}",
                format!("{}:", group.prototype_name).bright_black(),
                format!("{}/{}", group.instances, group.members).cyan(),
                "converted".bright_black(),
                strategy.yellow()
            );
        }

        if !report.skipped.is_empty() {
            println!(
                "\n{} {}",
                "Skipped:".bold(),
                report.skipped.len().to_string().yellow()
            );
            if verbose {
                for skip in &report.skipped {
                    println!(
                        "  {} {} {}",
                        format!("{} {}", skip.stage, skip.node).bright_black(),
                        skip.kind.yellow(),
                        skip.reason
                    );
                }
            }
        }

        println!("\n{}", "Performance:".bold());
        println!(
            "  {} {}",
            "Time:".bright_black(),
            Self::format_duration(duration).yellow()
        );
        println!("{}", "━".repeat(80).bright_black());
    }

    /// Duplicate groups found without converting anything
    pub fn report_groups(scene: &str, groups: &[InstanceGroup]) {
        println!("\n{}", "━".repeat(80).bright_black());
        println!("{} {}", "Scene:".bold(), scene.cyan());
        println!("{}", "━".repeat(80).bright_black());

        let duplicates: Vec<&InstanceGroup> = groups.iter().filter(|g| g.has_members()).collect();
        println!(
            "  {} {}",
            "Groups:".bright_black(),
            duplicates.len().to_string().cyan()
        );
        println!(
            "  {} {}",
            "Unique:".bright_black(),
            (groups.len() - duplicates.len()).to_string().cyan()
        );

        for group in duplicates {
            println!(
                "\n  {} {} {}",
                group.prototype.name.bold(),
                group.prototype.node.to_string().bright_black(),
                format!("× {}", group.size()).cyan()
            );
            for member in &group.members {
                println!(
                    "    {} {} {}",
                    member.name,
                    member.node.to_string().bright_black(),
                    Self::stage_label(member.stage).bright_black()
                );
            }
        }
        println!("{}", "━".repeat(80).bright_black());
    }

    /// Report error
    pub fn report_error(message: &str) {
        eprintln!("\n{} {}", "❌ Error:".red().bold(), message);
    }

    /// Report info
    pub fn report_info(message: &str) {
        println!("{} {}", "ℹ️".bright_blue(), message);
    }

    /// Print success message
    pub fn success(message: &str) {
        println!("{} {}", "✅".green(), message.green());
    }

    fn stage_label(stage: Option<MatchStage>) -> String {
        match stage {
            Some(stage) => format!("({stage:?})").to_lowercase(),
            None => String::new(),
        }
    }

    /// Format duration for display
    fn format_duration(duration: Duration) -> String {
        let micros = duration.as_micros();

        if micros < 1_000 {
            format!("{}µs", micros)
        } else if micros < 1_000_000 {
            format!("{:.2}ms", micros as f64 / 1_000.0)
        } else {
            format!("{:.2}s", micros as f64 / 1_000_000.0)
        }
    }
}
