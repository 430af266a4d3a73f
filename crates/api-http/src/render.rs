//! HTML pages
//!
//! Each page is complete: the client replaces its whole body with whatever
//! comes back, success or failure.

use axum::http::StatusCode;
use jobctl_core::application::ControlWarning;
use jobctl_core::domain::{allowed_actions, Job, JobAction, JobState, TransitionRecord};
use std::fmt::Write;

/// Path the page script is served from
pub const SCRIPT_PATH: &str = "/js/job_links.js";

/// Client script that turns the action links into lifecycle requests
pub const JOB_LINKS_JS: &str = include_str!("../assets/job_links.js");

pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{}</title>\n<script src=\"{}\" defer></script></head>\n<body>\n{}</body>\n</html>\n",
        escape(title),
        SCRIPT_PATH,
        body
    )
}

fn job_href(id: &str) -> String {
    format!("/jobs/{}", escape(id))
}

/// Links for every action legal in the current state. The class names are
/// what the page script binds its click handlers to.
fn action_links(job: &Job) -> String {
    let mut out = String::new();
    for action in allowed_actions(job.state) {
        let _ = write!(
            out,
            "<a class=\"{}job\" href=\"{}\">{}</a> ",
            action,
            job_href(&job.id),
            action
        );
    }
    out
}

fn action_verb(action: Option<JobAction>) -> &'static str {
    action.map(|a| a.as_str()).unwrap_or("-")
}

pub fn job_page(
    job: &Job,
    warning: Option<&ControlWarning>,
    history: Option<&[TransitionRecord]>,
) -> String {
    let mut body = String::new();
    let _ = writeln!(body, "<h1>Job {}</h1>", escape(&job.id));
    if let Some(warning) = warning {
        let _ = writeln!(
            body,
            "<p class=\"warning\">{}</p>",
            escape(&warning.to_string())
        );
    }
    body.push_str("<dl>\n");
    let _ = writeln!(
        body,
        "<dt>Label</dt><dd>{}</dd>",
        escape(job.label.as_deref().unwrap_or("-"))
    );
    let _ = writeln!(
        body,
        "<dt>State</dt><dd class=\"state\">{}</dd>",
        job.state
    );
    let _ = writeln!(body, "<dt>Version</dt><dd>{}</dd>", job.version);
    let _ = writeln!(
        body,
        "<dt>Last action</dt><dd>{}</dd>",
        action_verb(job.last_action)
    );
    let _ = writeln!(body, "<dt>Updated</dt><dd>{}</dd>", job.updated_at);
    body.push_str("</dl>\n");

    let links = action_links(job);
    if !links.is_empty() {
        let _ = writeln!(body, "<p class=\"actions\">{}</p>", links.trim_end());
    }

    if let Some(history) = history {
        body.push_str("<h2>History</h2>\n<table>\n<tr><th>Version</th><th>Action</th><th>From</th><th>To</th><th>At</th></tr>\n");
        for record in history {
            let _ = writeln!(
                body,
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                record.version, record.action, record.from, record.to, record.at
            );
        }
        body.push_str("</table>\n");
    }
    body.push_str("<p><a href=\"/jobs\">All jobs</a></p>\n");

    page(&format!("Job {}", job.id), &body)
}

pub fn job_list_page(jobs: &[Job], state: Option<JobState>) -> String {
    let mut body = String::new();
    match state {
        Some(state) => {
            let _ = writeln!(body, "<h1>Jobs ({})</h1>", state);
        }
        None => body.push_str("<h1>Jobs</h1>\n"),
    }

    if jobs.is_empty() {
        body.push_str("<p>No jobs.</p>\n");
    } else {
        body.push_str("<table>\n<tr><th>Id</th><th>Label</th><th>State</th><th>Version</th><th>Actions</th></tr>\n");
        for job in jobs {
            let _ = writeln!(
                body,
                "<tr><td><a href=\"{}\">{}</a></td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                job_href(&job.id),
                escape(&job.id),
                escape(job.label.as_deref().unwrap_or("")),
                job.state,
                job.version,
                action_links(job).trim_end()
            );
        }
        body.push_str("</table>\n");
    }

    body.push_str(
        "<form method=\"post\" action=\"/jobs\">\n\
         <input name=\"label\" placeholder=\"label\">\n\
         <button type=\"submit\">Submit job</button>\n\
         </form>\n",
    );
    page("Jobs", &body)
}

pub fn error_page(status: StatusCode, message: &str) -> String {
    let title = format!(
        "{} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Error")
    );
    let body = format!(
        "<h1>{}</h1>\n<p class=\"error\">{}</p>\n<p><a href=\"/jobs\">All jobs</a></p>\n",
        escape(&title),
        escape(message)
    );
    page(&title, &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(
            escape("<a href=\"x\">Tom & 'Jerry'</a>"),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_job_page_links_only_legal_actions() {
        let mut job = Job::new("job-1", 0, Some("<b>nightly</b>".to_string()));
        job.state = JobState::Running;

        let html = job_page(&job, None, None);
        assert!(html.contains("class=\"pausejob\""));
        assert!(html.contains("class=\"stopjob\""));
        assert!(html.contains("class=\"killjob\""));
        assert!(!html.contains("class=\"startjob\""));
        assert!(!html.contains("class=\"deletejob\""));
        assert!(html.contains("&lt;b&gt;nightly&lt;/b&gt;"));
    }

    #[test]
    fn test_job_page_shows_warning() {
        let job = Job::new("job-1", 0, None);
        let warning = ControlWarning::ExecutionSignalFailed {
            job_id: "job-1".to_string(),
            reason: "queue full".to_string(),
        };

        let html = job_page(&job, Some(&warning), None);
        assert!(html.contains("class=\"warning\""));
        assert!(html.contains("queue full"));
    }

    #[test]
    fn test_pages_load_link_script() {
        let job = Job::new("job-1", 0, None);
        let tag = format!("<script src=\"{}\" defer></script>", SCRIPT_PATH);

        assert!(job_page(&job, None, None).contains(&tag));
        assert!(job_list_page(&[job], None).contains(&tag));
        assert!(error_page(StatusCode::NOT_FOUND, "gone").contains(&tag));
        for action in JobAction::ALL {
            assert!(JOB_LINKS_JS.contains(&format!("'{}'", action)), "{action}");
        }
    }

    #[test]
    fn test_error_page() {
        let html = error_page(StatusCode::CONFLICT, "cannot start <job>");
        assert!(html.contains("409 Conflict"));
        assert!(html.contains("cannot start &lt;job&gt;"));
    }
}
