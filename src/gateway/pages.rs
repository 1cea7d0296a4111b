//! Server-rendered HTML for the dashboard and the login screens.

use super::dashboard::LogButton;
use crate::multipass::AuthProvider;
use crate::session::{Flash, FlashCategory};
use std::sync::Arc;

fn base_style() -> &'static str {
    r#"
    * { margin: 0; padding: 0; box-sizing: border-box; }
    body {
        font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
        background: #f5f5f5; color: #333;
        display: flex; justify-content: center; align-items: center;
        min-height: 100vh; padding: 20px;
    }
    .card {
        background: #fff; border-radius: 16px; padding: 32px;
        max-width: 520px; width: 100%; box-shadow: 0 4px 24px rgba(0,0,0,0.08);
    }
    .logo { text-align: center; margin-bottom: 24px; }
    .logo h1 { font-size: 28px; color: #1a1a2e; }
    .logo p { font-size: 14px; color: #666; margin-top: 4px; }
    .center { display: flex; justify-content: center; align-items: center; gap: 24px; height: 120px; }
    .form-group { margin-bottom: 16px; }
    .form-group label { display: block; font-size: 14px; font-weight: 500; margin-bottom: 6px; color: #444; }
    .form-group input {
        width: 100%; padding: 12px 14px; border: 1.5px solid #ddd;
        border-radius: 10px; font-size: 16px; outline: none; transition: border-color 0.2s;
    }
    .form-group input:focus { border-color: #4a6cf7; }
    .btn {
        display: inline-block; padding: 12px 20px; border: none; border-radius: 6px;
        font-size: 16px; font-weight: 600; cursor: pointer; text-decoration: none;
        text-transform: capitalize; color: #fff;
    }
    .btn-block { width: 100%; }
    .btn-green { background: #2f9e44; }
    .btn-red { background: #e03131; }
    .btn-primary { background: #4a6cf7; }
    .btn-gradient { background: linear-gradient(35deg, #9c36b5, #d6336c); border-radius: 32px; }
    .provider-list a { display: block; margin-bottom: 10px; text-align: center; }
    .flash { padding: 10px 14px; border-radius: 8px; font-size: 13px; margin-bottom: 16px; }
    .flash-success { background: #ebfbee; color: #2b8a3e; }
    .flash-error { background: #fff0f0; color: #d32f2f; }
    .flash-info { background: #f0f4ff; color: #364fc7; }
    .notification {
        margin-top: 16px; padding: 14px 16px; border-radius: 10px; border-left: 4px solid;
        background: #fafafa; font-size: 14px;
    }
    .notification.green { border-color: #2f9e44; }
    .notification.red { border-color: #e03131; }
    .notification strong { display: block; margin-bottom: 4px; }
    .link { text-align: center; margin-top: 16px; font-size: 14px; color: #666; }
    .link a { color: #4a6cf7; text-decoration: none; }
    "#
}

/// Minimal HTML escaping for interpolated text and attribute values.
pub fn escape_html(raw: &str) -> String {
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

fn render_flashes(flashes: &[Flash]) -> String {
    flashes
        .iter()
        .map(|f| {
            let class = match f.category {
                FlashCategory::Success => "flash-success",
                FlashCategory::Error => "flash-error",
                FlashCategory::Info => "flash-info",
            };
            format!(
                r#"<div class="flash {class}">{}</div>"#,
                escape_html(&f.message)
            )
        })
        .collect()
}

fn render_button(button: &LogButton) -> String {
    format!(
        r#"<a id="log" class="btn btn-{color}" href="{href}">{title}</a>"#,
        color = escape_html(&button.color),
        href = escape_html(&button.href),
        title = escape_html(&button.title),
    )
}

/// Dashboard: login/logout button, connection test button, notifications.
pub fn render_dashboard(button: &LogButton, flashes: &[Flash]) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en"><head>
<meta charset="utf-8"><meta name="viewport" content="width=device-width,initial-scale=1">
<title>Dashboard</title>
<style>{style}</style>
</head><body>
<div class="card">
  <div class="logo"><h1>Dashboard</h1><p>Single sign-on demo</p></div>
  {flashes}
  <div class="center">
    <div id="button">{button}</div>
    <button id="obj1" class="btn btn-gradient" type="button">Test connection status</button>
  </div>
  <div id="notifications-container"></div>
</div>
<script>
(function() {{
  var clicks = 0;
  function esc(s) {{
    var d = document.createElement('div'); d.textContent = s; return d.innerHTML;
  }}
  function refreshButton() {{
    fetch('/api/button', {{ credentials: 'same-origin' }})
      .then(function(r) {{ return r.json(); }})
      .then(function(b) {{
        document.getElementById('button').innerHTML =
          '<a id="log" class="btn btn-' + esc(b.color) + '" href="' + esc(b.href) + '">' + esc(b.title) + '</a>';
      }});
  }}
  document.getElementById('obj1').addEventListener('click', function() {{
    clicks += 1;
    fetch('/api/status?clicks=' + clicks, {{ credentials: 'same-origin' }})
      .then(function(r) {{ return r.status === 204 ? null : r.json(); }})
      .then(function(n) {{
        if (!n) return;
        document.getElementById('notifications-container').innerHTML =
          '<div class="notification ' + esc(n.color) + '" id="' + esc(n.id) + '">' +
          '<strong>' + esc(n.title) + '</strong>' + esc(n.message) + '</div>';
      }});
  }});
  refreshButton();
}})();
</script>
</body></html>"#,
        style = base_style(),
        flashes = render_flashes(flashes),
        button = render_button(button),
    )
}

/// Provider picker shown when more than one provider is configured.
pub fn render_login_selector(providers: &[Arc<dyn AuthProvider>], flashes: &[Flash]) -> String {
    let links: String = providers
        .iter()
        .map(|p| {
            format!(
                r#"<a class="btn btn-primary btn-block" href="/login/{name}">{title}</a>"#,
                name = escape_html(p.name()),
                title = escape_html(p.title()),
            )
        })
        .collect();

    format!(
        r#"<!DOCTYPE html>
<html lang="en"><head>
<meta charset="utf-8"><meta name="viewport" content="width=device-width,initial-scale=1">
<title>Log in</title>
<style>{style}</style>
</head><body>
<div class="card">
  <div class="logo"><h1>Log in</h1><p>Choose how to sign in</p></div>
  {flashes}
  <div class="provider-list">{links}</div>
  <div class="link"><a href="/">Back to dashboard</a></div>
</div>
</body></html>"#,
        style = base_style(),
        flashes = render_flashes(flashes),
    )
}

/// Username/password form for form-based providers.
pub fn render_login_form(provider: &dyn AuthProvider, flashes: &[Flash]) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en"><head>
<meta charset="utf-8"><meta name="viewport" content="width=device-width,initial-scale=1">
<title>Log in - {title}</title>
<style>{style}</style>
</head><body>
<div class="card">
  <div class="logo"><h1>Log in</h1><p>{title}</p></div>
  {flashes}
  <form method="POST" action="/login/{name}">
    <div class="form-group">
      <label>Username</label>
      <input type="text" name="username" required autocomplete="username" placeholder="Enter username">
    </div>
    <div class="form-group">
      <label>Password</label>
      <input type="password" name="password" required autocomplete="current-password" placeholder="Enter password">
    </div>
    <button type="submit" class="btn btn-primary btn-block">Log in</button>
  </form>
  <div class="link"><a href="/login/">Other login options</a></div>
</div>
</body></html>"#,
        style = base_style(),
        title = escape_html(provider.title()),
        name = escape_html(provider.name()),
        flashes = render_flashes(flashes),
    )
}

/// Plain message page (unknown provider, internal errors).
pub fn render_message(title: &str, message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en"><head>
<meta charset="utf-8"><meta name="viewport" content="width=device-width,initial-scale=1">
<title>{title}</title>
<style>{style}</style>
</head><body>
<div class="card">
  <div class="logo"><h1>{title}</h1></div>
  <p style="text-align:center;font-size:14px;color:#666;">{message}</p>
  <div class="link"><a href="/">Back to dashboard</a></div>
</div>
</body></html>"#,
        style = base_style(),
        title = escape_html(title),
        message = escape_html(message),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_html_covers_markup_characters() {
        assert_eq!(
            escape_html(r#"<a href="x">'&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn flashes_are_escaped() {
        let html = render_flashes(&[Flash {
            category: FlashCategory::Success,
            message: "Received IdentityInfo: <IdentityInfo(sso, ada)>".into(),
        }]);
        assert!(html.contains("flash-success"));
        assert!(html.contains("&lt;IdentityInfo(sso, ada)&gt;"));
    }

    #[test]
    fn dashboard_contains_both_buttons() {
        let button = LogButton {
            title: "Log in".into(),
            icon: "ion:log-in-outline".into(),
            color: "green".into(),
            href: "http://127.0.0.1:8050/login".into(),
        };
        let html = render_dashboard(&button, &[]);
        assert!(html.contains(r#"href="http://127.0.0.1:8050/login""#));
        assert!(html.contains("Test connection status"));
        assert!(html.contains("notifications-container"));
    }
}
