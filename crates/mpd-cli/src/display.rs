//! Messages shared by several commands

use mpd_core::session::SelectOutcome;
use mpd_core::Project;

/// Print the project's areas and the packages it will develop.
pub fn print_config_info(project: &Project) {
    println!("\nUsing build area: {}", project.build.display());
    println!("Using local area: {}", project.local.display());
    println!("Using sources area: {}\n", project.source.display());
    if !project.ignored.is_empty() {
        println!("  Ignoring (not known packages): {}\n", project.ignored.join(" "));
    }
    if !project.has_packages() {
        return;
    }

    println!("  Will develop:");
    for (name, requirement) in &project.packages {
        println!("    - {name}{}", requirement.spec_string());
    }
    println!();
}

/// Report a selection, warning when other shells share the project.
pub fn print_selection(name: &str, outcome: &SelectOutcome) {
    if outcome.already_selected {
        println!("==> Project {name} is already selected");
    } else {
        println!("==> Project {name} selected");
    }
    if !outcome.other_sessions.is_empty() {
        let sessions: Vec<String> = outcome
            .other_sessions
            .iter()
            .map(ToString::to_string)
            .collect();
        eprintln!(
            "Warning: project {name} is also selected in other shells (sessions {})",
            sessions.join(", ")
        );
    }
}

/// Tell the user how to add packages to an empty project.
pub fn print_clone_hint() {
    println!(
        "==> You can clone repositories for development by invoking\n\n  \
         mpd git-clone --suites <suite name>\n\n  \
         (or type 'mpd git-clone --help' for more options)\n"
    );
}
