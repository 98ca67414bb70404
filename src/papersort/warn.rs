fn sanitize_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_sep = false;
    for ch in value.chars() {
        if ch.is_whitespace() {
            if !out.is_empty() && !prev_sep {
                out.push('_');
                prev_sep = true;
            }
        } else if !ch.is_control() {
            out.push(ch);
            prev_sep = false;
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "na".to_string()
    } else {
        trimmed.to_string()
    }
}

/// One per-file failure, rendered as a single greppable line.
#[derive(Debug, Clone, Default)]
pub struct WarnEvent<'a> {
    pub code: &'a str,
    pub stage: &'a str,
    pub action: &'a str,
    pub file: &'a str,
    pub hash: &'a str,
    pub retry: &'a str,
    pub reason: &'a str,
    pub err: &'a str,
}

impl WarnEvent<'_> {
    pub fn render(&self) -> String {
        format!(
            "PAPERSORT_WARN code={} stage={} action={} file={} hash={} retry={} reason={} err={}",
            sanitize_value(self.code),
            sanitize_value(self.stage),
            sanitize_value(self.action),
            sanitize_value(self.file),
            sanitize_value(self.hash),
            sanitize_value(self.retry),
            sanitize_value(self.reason),
            sanitize_value(self.err),
        )
    }
}

pub fn emit(event: WarnEvent<'_>) {
    tracing::warn!("{}", event.render());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_value_rewrites_whitespace() {
        assert_eq!(sanitize_value("a b\tc"), "a_b_c");
        assert_eq!(sanitize_value("Bank Statement 2024.pdf"), "Bank_Statement_2024.pdf");
    }

    #[test]
    fn sanitize_value_falls_back_for_empty() {
        assert_eq!(sanitize_value("   "), "na");
    }

    #[test]
    fn render_keeps_field_order_and_defaults() {
        let line = WarnEvent {
            code: "FILE_FAILED",
            stage: "classify",
            file: "inbox/a b.pdf",
            ..Default::default()
        }
        .render();
        assert_eq!(
            line,
            "PAPERSORT_WARN code=FILE_FAILED stage=classify action=na file=inbox/a_b.pdf hash=na retry=na reason=na err=na"
        );
    }
}
