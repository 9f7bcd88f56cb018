//! Implementation of the `mpd git-clone` command.

use anyhow::{bail, Result};
use mpd_core::host::CloneOutcome;
use mpd_core::orchestrate::CloneReport;
use mpd_core::repos;
use mpd_core::{Orchestrator, Predicate};
use std::collections::BTreeMap;

/// What to clone, or what to list.
#[derive(Debug)]
pub struct CloneOptions {
    pub repos: Vec<String>,
    pub suites: Vec<String>,
    pub help_repos: bool,
    pub help_suites: bool,
}

pub fn clone(mpd: &Orchestrator<'_>, options: &CloneOptions) -> Result<()> {
    if options.repos.is_empty() && options.suites.is_empty() {
        mpd.prepare(&[Predicate::Initialized], &[])?;
        if options.help_suites {
            print_suites();
        } else if options.help_repos {
            print_repositories();
        } else {
            bail!("At least one option required (see 'mpd git-clone --help')");
        }
        return Ok(());
    }

    mpd.prepare(&[Predicate::Initialized, Predicate::ProjectSelected], &[])?;
    let project = mpd.require_selected()?;

    let mut reports = mpd.clone_repositories(&project, &options.repos);
    for suite in &options.suites {
        match mpd.clone_suite(&project, suite) {
            Some(cloned) => reports.extend(cloned),
            None => eprintln!("Warning: Skipping unknown suite '{suite}'"),
        }
    }

    if reports.is_empty() {
        println!("==> No repositories added");
        return Ok(());
    }

    println!("\n==> Cloning into {}:\n", project.source.display());
    let width = reports.iter().map(|r| r.name.len()).max().unwrap_or(0) + 3;
    for report in &reports {
        println!("  {}", report_line(report, width));
    }

    if reports.iter().any(|r| r.outcome == CloneOutcome::Cloned) {
        println!("\nYou may now invoke:\n\n  mpd refresh\n");
    } else {
        println!("\n==> No repositories added\n");
    }
    Ok(())
}

fn report_line(report: &CloneReport, width: usize) -> String {
    let outcome = match &report.outcome {
        CloneOutcome::Cloned => "done".to_string(),
        CloneOutcome::AlreadyExists => "skipped (already exists)".to_string(),
        CloneOutcome::Failed(message) => format!("error ({message})"),
    };
    format!("{:.<width$}  {outcome}", format!("{} ", report.name))
}

fn print_suites() {
    println!("\nThe following suites are available for cloning:\n");
    let width = repos::SUITES.iter().map(|s| s.name.len()).max().unwrap_or(0);
    for suite in repos::SUITES {
        println!("  {:<width$}  {}", suite.name, suite.repos.join(", "));
    }
    println!();
}

fn print_repositories() {
    let known: BTreeMap<String, String> = repos::known_repositories();
    println!("\nThe following repositories can be cloned by name:\n");
    let width = known.keys().map(String::len).max().unwrap_or(0);
    for (name, url) in &known {
        println!("  {name:<width$}  {url}");
    }
    println!("\nAny other repository may be cloned by URL.\n");
}
