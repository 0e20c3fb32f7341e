//! Multi-section diagnostic report used for error responses and dry runs.

use qx_common::QxError;

use crate::context::QueryContext;

const SEP: &str = "----------------------------------------------------------------";

/// Trailer appended to dry-run reports.
pub const DRY_RUN_TIP: &str = "This query was planned but not executed (dry run). \
Review the sub-plan match section to see which realizations would serve it.";

/// Assemble the fixed-order diagnostic report: last exception, last-used
/// plan, sub-plan match summaries, SQL text, physical plan text.
pub fn build_report(ctx: &QueryContext, cause: &str, physical_plan: Option<&str>) -> String {
    let mut out = String::new();
    out.push_str(SEP);
    out.push('\n');

    out.push_str("1. Last exception:\n");
    out.push_str("   ");
    if cause.is_empty() {
        out.push_str(ctx.last_error.as_deref().unwrap_or("none"));
    } else {
        out.push_str(cause);
    }
    out.push('\n');

    out.push_str("2. Last used plan:\n   ");
    out.push_str(ctx.last_used_plan.as_deref().unwrap_or("none"));
    out.push('\n');

    out.push_str("3. Sub-plan matches:\n");
    if ctx.match_contexts.is_empty() {
        out.push_str("   (no sub-plan contexts recorded)\n");
    }
    for m in &ctx.match_contexts {
        match &m.realization {
            Some(r) => out.push_str(&format!(
                "   [{}] matched model={} index={} layout={}\n",
                m.id, r.model, r.index_type, r.layout_id
            )),
            None => out.push_str(&format!("   [{}] unmatched: {}\n", m.id, m.hint)),
        }
    }

    out.push_str("4. SQL:\n   ");
    out.push_str(&ctx.sql);
    out.push('\n');

    out.push_str("5. Physical plan:\n");
    match physical_plan {
        Some(text) => {
            for line in text.lines() {
                out.push_str("   ");
                out.push_str(line);
                out.push('\n');
            }
        }
        None => out.push_str("   physical plan not exists\n"),
    }

    if ctx.dry_run {
        out.push_str(SEP);
        out.push('\n');
        out.push_str(DRY_RUN_TIP);
        out.push('\n');
    }
    out.push_str(SEP);
    out
}

/// Wrap a terminal error for the caller: dry-run contexts get the full
/// report, everything else gets the SQL text plus the underlying cause.
/// Cancellation passes through untouched.
pub fn wrap_error(ctx: &QueryContext, err: QxError) -> QxError {
    if matches!(err, QxError::Cancelled(_)) {
        return err;
    }
    if ctx.dry_run {
        return QxError::Execution(build_report(ctx, &err.to_string(), None));
    }
    QxError::Execution(format!(
        "Error while executing SQL \"{}\": {}",
        ctx.sql, err
    ))
}
