use colored::Colorize;
use folio_bot_detection::{AnalysisVerdict, BatchReport};

pub fn print_verdict(request_id: i32, verdict: &AnalysisVerdict) {
    let label = if verdict.skipped {
        "SKIPPED".bright_black().bold()
    } else if verdict.is_bot {
        "BOT".bright_red().bold()
    } else {
        "HUMAN".bright_green().bold()
    };

    println!("{} {}", format!("#{}", request_id).bright_white().bold(), label);

    if let Some(reason) = &verdict.skip_reason {
        println!("    {}", reason.bright_black());
    }
    for reason in &verdict.reasons {
        println!("    {} {}", "-".bright_black(), reason.bright_yellow());
    }
}

pub fn print_report(title: &str, report: &BatchReport) {
    println!();
    println!("{}", title.bright_white().bold());

    if report.is_empty() {
        println!("{}", "Nothing to analyze.".bright_black());
        println!();
        return;
    }

    for processed in &report.processed {
        print_verdict(processed.request_id, &processed.verdict);
    }
    for failure in &report.failures {
        let hint = if failure.retryable {
            "will be retried by the next run"
        } else {
            "not retryable"
        };
        println!(
            "{} {} {} ({})",
            format!("#{}", failure.request_id).bright_white().bold(),
            "FAILED".red().bold(),
            failure.error,
            hint.bright_black()
        );
    }

    let summary = report.summary();
    println!();
    println!(
        "{} {}",
        "Summary:".bright_white().bold(),
        summary.to_string().bright_cyan()
    );
    println!();
}
