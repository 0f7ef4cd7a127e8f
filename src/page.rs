//! The home page: a snapshot of the primary file plus the client script.

use std::path::Path;
use std::time::SystemTime;

use crate::error::Result;
use crate::hint::ResumeHint;

/// Reads the whole file if it was modified after `since`.
///
/// Returns `None` content when the file is unchanged, along with the
/// modification time that was observed.
pub async fn read_file_if_modified(
    path: &Path,
    since: SystemTime,
) -> Result<(Option<Vec<u8>>, SystemTime)> {
    let modified = tokio::fs::metadata(path).await?.modified()?;
    if modified <= since {
        return Ok((None, since));
    }
    let content = tokio::fs::read(path).await?;
    Ok((Some(content), modified))
}

/// Renders the page showing `data` that streams updates from `ws://{host}/ws`.
pub fn render_home(host: &str, data: &str, last_mod: ResumeHint) -> String {
    HOME_TEMPLATE
        .replace("{{HOST}}", &escape_html(host))
        .replace("{{LAST_MOD}}", &last_mod.to_string())
        .replace("{{DATA}}", &escape_html(data))
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&#34;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

const HOME_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
    <head>
        <title>WebSocket Example</title>
    </head>
    <body>
        <pre id="fileData">{{DATA}}</pre>
        <script type="text/javascript">
            (function() {
                var data = document.getElementById("fileData");
                var conn = new WebSocket("ws://{{HOST}}/ws?lastMod={{LAST_MOD}}");
                conn.onclose = function(evt) {
                    data.textContent = 'Connection closed';
                }
                conn.onmessage = function(evt) {
                    console.log('file updated');
                    data.textContent = evt.data;
                }
            })();
        </script>
    </body>
</html>
"#;
