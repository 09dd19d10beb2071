//! Terminal rendering of probes, verdicts and surveys.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use natprobe_discovery::{
    Classification, NatVerdict, ProbeObserver, ProbeOutcome, ProbeVariant, ServerDescriptor,
    ServerSurvey,
};
use std::time::Duration;

/// Prints one table row per probe under a spinner
pub struct ProbeTable {
    bar: ProgressBar,
}

impl ProbeTable {
    /// Create the spinner and print the table header
    #[must_use]
    pub fn start() -> Self {
        let bar = ProgressBar::new_spinner();
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        bar.set_style(spinner_style);
        bar.enable_steady_tick(Duration::from_millis(100));

        let header = format!(
            "  {:<8} {:<32} {:<21} {}",
            "TEST", "SERVER", "LOCAL", "RESULT"
        );
        bar.println(style(header).bold().to_string());

        Self { bar }
    }

    /// Stop and clear the spinner
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProbeObserver for ProbeTable {
    fn on_probe_started(&self, server: &ServerDescriptor, variant: ProbeVariant) {
        self.bar.set_message(format!("Probing {server} ({variant})"));
    }

    fn on_probe(&self, outcome: &ProbeOutcome) {
        self.bar.println(format_row(outcome));
    }

    fn on_verdict(&self, _verdict: NatVerdict) {
        self.bar.finish_and_clear();
    }
}

/// One line describing a probe
#[must_use]
pub fn format_row(outcome: &ProbeOutcome) -> String {
    let mark = if outcome.succeeded() {
        style("✓").green()
    } else {
        style("✗").red()
    };

    let detail = match (outcome.mapped_endpoint(), outcome.failure_reason()) {
        (Some(mapped), _) => match outcome.responding_endpoint() {
            Some(from) => format!("mapped {mapped} (answered from {from})"),
            None => format!("mapped {mapped}"),
        },
        (None, Some(failure)) => failure.to_string(),
        (None, None) => "no answer".to_string(),
    };

    let local = outcome
        .local_endpoint()
        .map_or_else(|| "-".to_string(), |local| local.to_string());

    format!(
        "{} {:<8} {:<32} {:<21} {}",
        mark,
        outcome.variant().to_string(),
        outcome.server().to_string(),
        local,
        detail
    )
}

/// Print the final verdict of a classification
pub fn print_classification(classification: &Classification) {
    let verdict = classification.verdict;
    let styled = if verdict.is_natted() {
        style(verdict.to_string()).yellow().bold()
    } else if verdict == NatVerdict::OpenInternet {
        style(verdict.to_string()).green().bold()
    } else {
        style(verdict.to_string()).red().bold()
    };

    println!();
    println!("NAT type:        {styled}");
    println!("Classification:  {}", verdict.rfc4787_name());
    match classification.public_endpoint {
        Some(endpoint) => println!("Public endpoint: {endpoint}"),
        None => println!("Public endpoint: unknown"),
    }
}

/// Print what a server survey found; the probe rows were shown live
pub fn print_survey_summary(survey: &ServerSurvey) {
    let summary = if survey.supports_classification() {
        style("usable for NAT classification").green()
    } else if survey.is_reachable() {
        style("reachable, CHANGE-REQUEST not fully supported").yellow()
    } else {
        style("unreachable").red()
    };
    println!("{} => {}", style(&survey.server).bold(), summary);
    println!();
}
