//! Minimal HTML for the embed viewer

use std::fmt::Write as _;

use crate::embed::EmbedConfiguration;

/// Page shown when the user has no embeds
pub const NO_EMBEDS_PAGE: &str = "<h3>No embed page configured for this user</h3>";

/// Page shown when minting failed
pub fn error_page(detail: &str) -> String {
    format!(
        "<h3>Error creating Domo embed token</h3><pre>{}</pre>",
        escape_html(detail)
    )
}

/// Viewer that posts each embed token to its iframe on load
pub fn embed_page(config: &EmbedConfiguration) -> String {
    let mut frames = String::new();
    for (i, embed) in config.embeds.iter().enumerate() {
        let action = format!("{}/embed/pages/{}", config.embed_host, embed.embed_id);
        let _ = write!(
            frames,
            r#"
    <form class="domoForm" action="{action}" method="post" target="domoFrame{i}">
      <input type="hidden" name="embedToken" value="{token}" />
    </form>
    <iframe name="domoFrame{i}" id="domoFrame{i}" frameborder="0" allowfullscreen></iframe>"#,
            action = escape_html(&action),
            token = escape_html(&embed.token),
        );
    }

    format!(
        r#"<!doctype html>
<html>
  <head>
    <meta charset="utf-8" />
    <title>Domo Embed</title>
    <style>html,body{{height:100%;margin:0;padding:0;border:0}} iframe{{display:block;width:100%;height:100vh;border:0}}</style>
  </head>
  <body>{frames}
    <script>document.querySelectorAll('form.domoForm').forEach(function (f) {{ f.submit(); }});</script>
  </body>
</html>
"#
    )
}

/// Escape text for HTML element content and quoted attributes
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}
