//! Auto-submitting checkout page for browsers that cannot POST the form themselves

use std::collections::HashMap;

use shared::error::{AppError, ErrorCode};

/// Every field eSewa requires on the form post, in display order
pub const CHECKOUT_FIELDS: [&str; 11] = [
    "amount",
    "tax_amount",
    "total_amount",
    "transaction_uuid",
    "product_code",
    "product_service_charge",
    "product_delivery_charge",
    "success_url",
    "failure_url",
    "signed_field_names",
    "signature",
];

pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
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

/// Render the hidden-input form posting to `action`.
///
/// Fails with the first missing (or empty) required field.
pub fn render(action: &str, query: &HashMap<String, String>) -> Result<String, AppError> {
    let mut inputs = String::new();
    for name in CHECKOUT_FIELDS {
        let value = query
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                AppError::with_message(
                    ErrorCode::CheckoutFieldMissing,
                    format!("Missing checkout field: {name}"),
                )
                .with_detail("field", name)
            })?;
        inputs.push_str(&format!(
            "      <input type=\"hidden\" name=\"{name}\" value=\"{}\" />\n",
            escape_html(value)
        ));
    }

    Ok(format!(
        "<!DOCTYPE html>
<html>
  <head>
    <meta charset=\"utf-8\" />
    <title>Redirecting to eSewa</title>
  </head>
  <body onload=\"document.forms[0].submit()\">
    <p>Redirecting to eSewa...</p>
    <form method=\"POST\" action=\"{action}\">
{inputs}      <noscript><button type=\"submit\">Continue to eSewa</button></noscript>
    </form>
  </body>
</html>
",
        action = escape_html(action),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_query() -> HashMap<String, String> {
        CHECKOUT_FIELDS
            .iter()
            .map(|name| (name.to_string(), format!("v-{name}")))
            .collect()
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & Jerry's</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; Jerry&#39;s&lt;/a&gt;"
        );
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn test_render_contains_every_field() {
        let html = render("https://rc-epay.esewa.com.np/api/epay/main/v2/form", &full_query()).unwrap();
        for name in CHECKOUT_FIELDS {
            assert!(
                html.contains(&format!("name=\"{name}\" value=\"v-{name}\"")),
                "missing {name}"
            );
        }
        assert!(html.contains("action=\"https://rc-epay.esewa.com.np/api/epay/main/v2/form\""));
        assert!(html.contains("document.forms[0].submit()"));
    }

    #[test]
    fn test_values_and_action_are_escaped() {
        let mut query = full_query();
        query.insert("signature".into(), "\"><script>alert(1)</script>".into());
        let html = render("https://pay.example/?a=1&b=\"2\"", &query).unwrap();
        assert!(!html.contains("<script>"));
        assert!(html.contains("&quot;&gt;&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(html.contains("action=\"https://pay.example/?a=1&amp;b=&quot;2&quot;\""));
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let mut query = full_query();
        query.remove("signature");
        let err = render("https://x", &query).unwrap_err();
        assert_eq!(err.code, ErrorCode::CheckoutFieldMissing);
        assert_eq!(err.http_status(), http::StatusCode::BAD_REQUEST);

        let mut query = full_query();
        query.insert("amount".into(), "   ".into());
        let err = render("https://x", &query).unwrap_err();
        assert_eq!(err.message, "Missing checkout field: amount");
    }
}
