//! Markdown report generation
//!
//! Renders a human-readable report of every job in the store: status
//! counts, one table row per job, and the broken links found on each page.

use crate::output::stats::JobStatistics;
use crate::output::OutputResult;
use crate::state::JobStatus;
use crate::storage::CrawlJob;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes the markdown report to `output_path`
pub fn generate_markdown_report(
    stats: &JobStatistics,
    jobs: &[CrawlJob],
    output_path: &Path,
) -> OutputResult<()> {
    let markdown = format_markdown_report(stats, jobs);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats the report as markdown
pub fn format_markdown_report(stats: &JobStatistics, jobs: &[CrawlJob]) -> String {
    let mut md = String::new();

    md.push_str("# Sumi-Survey Report\n\n");

    md.push_str("## Overview\n\n");
    md.push_str(&format!("- **Total Jobs**: {}\n", stats.total_jobs));
    for status in JobStatus::all() {
        md.push_str(&format!("- **{}**: {}\n", status_label(status), stats.count(status)));
    }
    md.push_str(&format!(
        "- **Success Rate**: {:.2}%\n\n",
        stats.success_rate()
    ));

    md.push_str("## Jobs\n\n");
    if jobs.is_empty() {
        md.push_str("_No jobs._\n\n");
    } else {
        md.push_str(
            "| URL | Status | Title | HTML Version | Internal | External | Login Form | Broken |\n",
        );
        md.push_str(
            "|-----|--------|-------|--------------|----------|----------|------------|--------|\n",
        );
        for job in jobs {
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} | {} | {} |\n",
                escape_cell(&job.url),
                status_label(job.status),
                escape_cell(&job.title),
                escape_cell(&job.html_version),
                job.internal_links,
                job.external_links,
                if job.has_login_form { "yes" } else { "no" },
                job.broken_links.len()
            ));
        }
        md.push('\n');
    }

    let failed: Vec<&CrawlJob> = jobs
        .iter()
        .filter(|job| job.status == JobStatus::Error)
        .collect();
    if !failed.is_empty() {
        md.push_str("## Failed Jobs\n\n");
        for job in failed {
            md.push_str(&format!("- {}: {}\n", job.url, job.error));
        }
        md.push('\n');
    }

    let with_broken: Vec<&CrawlJob> = jobs
        .iter()
        .filter(|job| !job.broken_links.is_empty())
        .collect();
    if !with_broken.is_empty() {
        md.push_str("## Broken Links\n\n");
        for job in with_broken {
            md.push_str(&format!("### {}\n\n", job.url));
            for link in &job.broken_links {
                let code = link
                    .status_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "no response".to_string());
                md.push_str(&format!("- {} ({}): {}\n", link.url, code, link.error));
            }
            md.push('\n');
        }
    }

    md
}

fn status_label(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Queued => "Queued",
        JobStatus::Running => "Running",
        JobStatus::Completed => "Completed",
        JobStatus::Error => "Error",
    }
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::BrokenLink;
    use std::collections::HashMap;

    fn completed_job() -> CrawlJob {
        let mut job = CrawlJob::new("http://example.com");
        job.status = JobStatus::Completed;
        job.title = "Home | Example".to_string();
        job.html_version = "HTML5".to_string();
        job.internal_links = 2;
        job.external_links = 1;
        job.has_login_form = true;
        job.broken_links = vec![BrokenLink {
            url: "http://gone.example".to_string(),
            status_code: Some(404),
            error: "HTTP 404 Not Found".to_string(),
        }];
        job
    }

    fn stats() -> JobStatistics {
        JobStatistics {
            total_jobs: 1,
            jobs_by_status: HashMap::from([(JobStatus::Completed, 1)]),
        }
    }

    #[test]
    fn test_report_contains_job_row() {
        let md = format_markdown_report(&stats(), &[completed_job()]);

        assert!(md.starts_with("# Sumi-Survey Report"));
        assert!(md.contains("- **Completed**: 1"));
        assert!(md.contains("| http://example.com | Completed | Home \\| Example | HTML5 | 2 | 1 | yes | 1 |"));
    }

    #[test]
    fn test_report_lists_broken_links() {
        let md = format_markdown_report(&stats(), &[completed_job()]);

        assert!(md.contains("## Broken Links"));
        assert!(md.contains("- http://gone.example (404): HTTP 404 Not Found"));
    }

    #[test]
    fn test_report_lists_failures() {
        let mut job = CrawlJob::new("http://down.example");
        job.status = JobStatus::Error;
        job.error = "failed to fetch URL: connection refused".to_string();

        let md = format_markdown_report(&JobStatistics::default(), &[job]);

        assert!(md.contains("## Failed Jobs"));
        assert!(md.contains("- http://down.example: failed to fetch URL: connection refused"));
        assert!(!md.contains("## Broken Links"));
    }

    #[test]
    fn test_empty_report() {
        let md = format_markdown_report(&JobStatistics::default(), &[]);
        assert!(md.contains("_No jobs._"));
    }

    #[test]
    fn test_generate_writes_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("report.md");

        generate_markdown_report(&stats(), &[completed_job()], &path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("Sumi-Survey Report"));
    }
}
