//! Hosted cluster dump command

use crate::cli::{DumpClusterArgs, OutputFormat};
use crate::client::resolve_access;
use crate::config::{load_config, DumpRequest};
use crate::dump::{Diagnostic, DumpReport, Dumper, Severity, SignatureHit, SignatureScanner};
use crate::error::Result;
use crate::process::TokioCommandRunner;
use owo_colors::OwoColorize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Build the request from CLI arguments
pub fn dump_request(args: &DumpClusterArgs) -> DumpRequest {
    DumpRequest::new(&args.namespace, &args.name, &args.artifact_dir)
        .with_agent_namespace(args.agent_namespace.clone())
        .with_impersonation(args.impersonate.clone())
        .with_guest_cluster(args.dump_guest_cluster)
}

/// Execute the cluster dump command
pub async fn run_dump(
    context: Option<&str>,
    args: &DumpClusterArgs,
    output: OutputFormat,
) -> Result<()> {
    let config = load_config()?;
    let request = dump_request(args);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping dump");
            on_interrupt.cancel();
        }
    });

    let access = resolve_access(context, request.impersonate.as_deref()).await?;
    let scanner = SignatureScanner::new(args.log_signatures.clone());

    let mut dumper = Dumper::new(
        request,
        config,
        access,
        Arc::new(TokioCommandRunner),
        cancel,
    );
    if !scanner.is_empty() {
        dumper = dumper.with_log_checker(scanner.checker());
    }

    let report = dumper.run().await?;

    match output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Yaml => {
            println!("{}", serde_yaml::to_string(&report)?);
        }
        OutputFormat::Text => print_report(&report, &scanner.hits()),
    }

    Ok(())
}

fn print_report(report: &DumpReport, hits: &[SignatureHit]) {
    println!();
    println!("{}", "Hosted Cluster Dump".bold());
    println!("{}", "=".repeat(50));

    if let Some(archive) = &report.archive {
        println!("Archive: {}", archive.display().to_string().green());
    }
    if let Some(finished) = report.finished_at {
        let elapsed = (finished - report.started_at).to_std().unwrap_or_default();
        println!(
            "Finished: {} ({})",
            finished.format("%Y-%m-%d %H:%M:%S UTC"),
            humantime::format_duration(elapsed)
        );
    }

    print!("Summary: ");
    let errors = report.error_count();
    let infos = report.info_count();
    if errors > 0 {
        print!("{} ", format!("{} errors", errors).red().bold());
    }
    if infos > 0 {
        print!("{} ", format!("{} info", infos).blue());
    }
    if errors == 0 && infos == 0 {
        print!("{}", "Everything collected".green());
    }
    println!();
    println!();

    let failures: Vec<_> = report
        .diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .collect();
    if !failures.is_empty() {
        println!("{}", "COLLECTION ERRORS".red().bold());
        println!("{}", "-".repeat(40));
        for diagnostic in failures {
            print_diagnostic(diagnostic);
        }
        println!();
    }

    if !hits.is_empty() {
        println!("{}", "LOG SIGNATURES".yellow().bold());
        println!("{}", "-".repeat(40));
        for hit in hits {
            println!("  {} {}", hit.signature.yellow(), hit.file.display().dimmed());
        }
        println!();
    }
}

fn print_diagnostic(diagnostic: &Diagnostic) {
    println!(
        "{} {} {}",
        "✗".red(),
        diagnostic.message.bold(),
        format!("[{}] {}", diagnostic.step, diagnostic.subject).dimmed()
    );
    if !diagnostic.args.is_empty() {
        println!("  {} {}", "Args:".cyan(), diagnostic.args.join(" "));
    }
}
