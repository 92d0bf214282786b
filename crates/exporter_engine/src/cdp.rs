//! Chromium-backed implementation of the UI scope, driven through CDP.
//!
//! DOM interrogation and actions go through JavaScript evaluation against
//! the live document. Resolved elements are parked in a per-window registry
//! (`window.__exq`) and addressed by index; a navigation replaces the window
//! object and thereby invalidates every outstanding handle, which matches
//! the scope contract: handles are re-resolved per workflow stage.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::browser_protocol::input::{DispatchKeyEventParams, DispatchKeyEventType};
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::scope::{DriverError, Query, Rect, TextMatch, UiNode, UiScope};

const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);
const SCROLL_CONTAINERS: &str =
    ".mat-drawer-content, .mat-sidenav-content, .cdk-virtual-scroll-viewport";

#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub headless: bool,
    pub window: (u32, u32),
    pub download_dir: PathBuf,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            window: (1366, 900),
            download_dir: std::env::temp_dir().join("exporter_downloads"),
        }
    }
}

/// One launched browser plus the page every export spec shares.
pub struct CdpSession {
    browser: Browser,
    page: Arc<Page>,
    download_dir: PathBuf,
    handler_task: JoinHandle<()>,
}

impl CdpSession {
    pub async fn launch(settings: BrowserSettings) -> Result<Self, DriverError> {
        std::fs::create_dir_all(&settings.download_dir)
            .map_err(|e| DriverError::Backend(e.to_string()))?;

        let mut builder = BrowserConfig::builder()
            .window_size(settings.window.0, settings.window.1)
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-blink-features=AutomationControlled");
        if !settings.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(DriverError::Backend)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| DriverError::Backend(e.to_string()))?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| DriverError::Backend(e.to_string()))?;
        page.execute(
            SetDownloadBehaviorParams::builder()
                .behavior(SetDownloadBehaviorBehavior::Allow)
                .download_path(settings.download_dir.to_string_lossy().to_string())
                .build()
                .map_err(DriverError::Backend)?,
        )
        .await
        .map_err(|e| DriverError::Backend(e.to_string()))?;

        Ok(Self {
            browser,
            page: Arc::new(page),
            download_dir: settings.download_dir,
            handler_task,
        })
    }

    pub fn page_scope(&self) -> CdpScope {
        CdpScope {
            page: self.page.clone(),
            frame_index: None,
            download_dir: self.download_dir.clone(),
        }
    }

    pub async fn close(mut self) {
        let _ = self.browser.close().await;
        let _ = self.browser.wait().await;
        self.handler_task.abort();
    }
}

/// The top-level document, or one same-origin embedded frame of it.
#[derive(Clone)]
pub struct CdpScope {
    page: Arc<Page>,
    frame_index: Option<usize>,
    download_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct JsRect {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

#[derive(Debug, Deserialize)]
struct JsNode {
    id: u64,
    visible: bool,
    text: String,
    rect: JsRect,
}

impl CdpScope {
    async fn eval<T: serde::de::DeserializeOwned>(&self, js: String) -> Result<T, DriverError> {
        let result = self
            .page
            .evaluate(js)
            .await
            .map_err(|e| DriverError::Backend(e.to_string()))?;
        result
            .into_value::<T>()
            .map_err(|e| DriverError::Backend(e.to_string()))
    }

    fn root_expr(&self) -> String {
        match self.frame_index {
            None => "document".to_string(),
            Some(i) => format!("((document.querySelectorAll('iframe')[{i}] || {{}}).contentDocument)"),
        }
    }

    fn element_root_expr(node: &UiNode) -> String {
        format!("((window.__exq || [])[{}])", node.id)
    }

    async fn run_query(&self, root: String, query: &Query) -> Result<Vec<UiNode>, DriverError> {
        let select_body = select_body(query);
        let matcher = matcher_decl(query);
        let js = format!(
            r#"(() => {{
  const doc = {root};
  if (!doc || !doc.querySelectorAll || doc.isConnected === false) {{ return []; }}
  window.__exq = window.__exq || [];
  const reg = window.__exq;
  {matcher}
  const found = (() => {{ {select_body} }})();
  return found.map((el) => {{
    let id = reg.indexOf(el);
    if (id < 0) {{ id = reg.length; reg.push(el); }}
    const r = el.getBoundingClientRect();
    const style = window.getComputedStyle(el);
    const visible = r.width > 0 && r.height > 0 &&
      style.visibility !== 'hidden' && style.display !== 'none';
    return {{ id, visible,
      text: (el.innerText || el.textContent || '').trim(),
      rect: {{ x: r.x, y: r.y, width: r.width, height: r.height }} }};
  }});
}})()"#
        );
        let nodes: Vec<JsNode> = self.eval(js).await?;
        Ok(nodes
            .into_iter()
            .map(|n| UiNode {
                id: n.id,
                visible: n.visible,
                text: n.text,
                rect: Some(Rect {
                    x: n.rect.x,
                    y: n.rect.y,
                    width: n.rect.width,
                    height: n.rect.height,
                }),
            })
            .collect())
    }

    async fn act(&self, node: &UiNode, body: &str) -> Result<(), DriverError> {
        let root = Self::element_root_expr(node);
        let js = format!(
            r#"(() => {{
  const el = {root};
  if (!el || el.isConnected === false) {{ return 'detached'; }}
  {body}
  return 'ok';
}})()"#
        );
        let status: String = self.eval(js).await?;
        match status.as_str() {
            "ok" => Ok(()),
            "detached" => Err(DriverError::Detached),
            other => Err(DriverError::Backend(other.to_string())),
        }
    }
}

#[async_trait]
impl UiScope for CdpScope {
    async fn query(&self, query: &Query) -> Result<Vec<UiNode>, DriverError> {
        self.run_query(self.root_expr(), query).await
    }

    async fn query_within(
        &self,
        node: &UiNode,
        query: &Query,
    ) -> Result<Vec<UiNode>, DriverError> {
        self.run_query(Self::element_root_expr(node), query).await
    }

    async fn click(&self, node: &UiNode) -> Result<(), DriverError> {
        self.act(node, "el.scrollIntoView({ block: 'center' }); el.click();")
            .await
    }

    async fn fill(&self, node: &UiNode, text: &str) -> Result<(), DriverError> {
        let value = js_string(text);
        let body = format!(
            "el.focus(); el.value = {value}; \
             el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
             el.dispatchEvent(new Event('change', {{ bubbles: true }}));"
        );
        self.act(node, &body).await
    }

    async fn attr(&self, node: &UiNode, name: &str) -> Result<Option<String>, DriverError> {
        let root = Self::element_root_expr(node);
        let attr = js_string(name);
        let js = format!(
            "(() => {{ const el = {root}; \
             return el && el.isConnected !== false ? el.getAttribute({attr}) : null; }})()"
        );
        self.eval(js).await
    }

    /// Keys go through the devtools input domain: events synthesized from
    /// page JavaScript are untrusted, and the browser performs no default
    /// action for them. Tab must move focus and Enter must submit a form.
    async fn press_key(&self, key: &str) -> Result<(), DriverError> {
        let (code, virtual_key, text) = key_descriptor(key);
        let mut down = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyDown)
            .key(key)
            .code(code)
            .windows_virtual_key_code(virtual_key)
            .native_virtual_key_code(virtual_key);
        if let Some(text) = text {
            down = down.text(text);
        }
        let down = down.build().map_err(DriverError::Backend)?;
        let up = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyUp)
            .key(key)
            .code(code)
            .windows_virtual_key_code(virtual_key)
            .native_virtual_key_code(virtual_key)
            .build()
            .map_err(DriverError::Backend)?;
        for event in [down, up] {
            self.page
                .execute(event)
                .await
                .map_err(|e| DriverError::Backend(e.to_string()))?;
        }
        Ok(())
    }

    async fn scroll_container(&self, pixels: i64) -> Result<(), DriverError> {
        let containers = js_string(SCROLL_CONTAINERS);
        let js = format!(
            "(() => {{ const c = document.querySelector({containers}); \
             if (c) {{ c.scrollBy(0, {pixels}); }} else {{ window.scrollBy(0, {pixels}); }} \
             return 'ok'; }})()"
        );
        let _: String = self.eval(js).await?;
        Ok(())
    }

    async fn frames(&self) -> Result<Vec<Box<dyn UiScope>>, DriverError> {
        if self.frame_index.is_some() {
            return Ok(Vec::new());
        }
        let count: u64 = self
            .eval("document.querySelectorAll('iframe').length".to_string())
            .await?;
        Ok((0..count as usize)
            .map(|i| {
                Box::new(CdpScope {
                    page: self.page.clone(),
                    frame_index: Some(i),
                    download_dir: self.download_dir.clone(),
                }) as Box<dyn UiScope>
            })
            .collect())
    }

    async fn goto(&self, url: &str) -> Result<(), DriverError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| DriverError::Goto(e.to_string()))?;
        let _ = self.page.wait_for_navigation().await;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        Ok(self
            .page
            .url()
            .await
            .map_err(|e| DriverError::Backend(e.to_string()))?
            .unwrap_or_default())
    }

    async fn settle(&self) -> Result<(), DriverError> {
        let deadline = Instant::now() + SETTLE_TIMEOUT;
        loop {
            let state: String = self.eval("document.readyState".to_string()).await?;
            if state == "complete" || Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        // Grace period for in-flight XHR-driven rendering.
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(())
    }

    async fn download(&self, node: &UiNode) -> Result<PathBuf, DriverError> {
        let before = list_dir(&self.download_dir)?;
        self.click(node).await?;

        let deadline = Instant::now() + DOWNLOAD_TIMEOUT;
        loop {
            for path in list_dir(&self.download_dir)? {
                if before.contains(&path)
                    || path.extension().and_then(|e| e.to_str()) == Some("crdownload")
                {
                    continue;
                }
                // Require the size to hold still across one tick.
                let first = file_len(&path);
                tokio::time::sleep(Duration::from_millis(300)).await;
                if first > 0 && file_len(&path) == first {
                    return Ok(path);
                }
            }
            if Instant::now() >= deadline {
                return Err(DriverError::Download(format!(
                    "no file appeared in {:?} within {DOWNLOAD_TIMEOUT:?}",
                    self.download_dir
                )));
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }
}

fn list_dir(dir: &PathBuf) -> Result<Vec<PathBuf>, DriverError> {
    let entries = std::fs::read_dir(dir).map_err(|e| DriverError::Download(e.to_string()))?;
    Ok(entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
}

fn file_len(path: &PathBuf) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Embeds a Rust string as a safely escaped JavaScript string literal.
fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

fn matcher_decl(query: &Query) -> String {
    let text = match query {
        Query::Role { name, .. } => name,
        Query::CssWithText { text, .. } => text,
        Query::Text(text) | Query::LabeledInput(text) => text,
        Query::Css(_) => return String::new(),
    };
    let needle = js_string(text.needle().trim());
    let mode_logic = match text {
        TextMatch::Exact(_) => "return t === needle;",
        TextMatch::Prefix(_) => {
            "if (!t.startsWith(needle)) { return false; } \
             const rest = t.slice(needle.length); \
             return !rest || !/[a-z0-9]/i.test(rest[0]);"
        }
        TextMatch::Contains(_) => "return t.includes(needle);",
    };
    format!(
        "const needle = {needle}.toLowerCase(); \
         const matches = (raw) => {{ const t = (raw || '').trim().toLowerCase(); {mode_logic} }};"
    )
}

fn select_body(query: &Query) -> String {
    match query {
        Query::Css(css) => {
            let sel = js_string(css);
            format!("return Array.from(doc.querySelectorAll({sel}));")
        }
        Query::CssWithText { css, .. } => {
            let sel = js_string(css);
            format!(
                "return Array.from(doc.querySelectorAll({sel}))\
                 .filter((el) => matches(el.innerText || el.textContent));"
            )
        }
        Query::Text(_) => {
            // Innermost matching elements only.
            "const all = Array.from(doc.querySelectorAll('*'))\
             .filter((el) => matches(el.innerText || el.textContent));\
             return all.filter((el) => !all.some((o) => o !== el && el.contains(o)));"
                .to_string()
        }
        Query::Role { role, .. } => {
            let sel = js_string(&role_selector(role));
            format!(
                "return Array.from(doc.querySelectorAll({sel}))\
                 .filter((el) => matches(el.getAttribute('aria-label') || el.innerText || el.textContent));"
            )
        }
        Query::LabeledInput(_) => "const out = [];\
             for (const label of Array.from(doc.querySelectorAll('label'))) {\
               if (!matches(label.innerText || label.textContent)) { continue; }\
               const forId = label.getAttribute('for');\
               const control = forId ? doc.getElementById(forId)\
                 : label.querySelector('input, textarea, select');\
               if (control) { out.push(control); }\
             }\
             for (const input of Array.from(doc.querySelectorAll('input, textarea, select'))) {\
               if (matches(input.getAttribute('aria-label'))) { out.push(input); }\
             }\
             return out;"
            .to_string(),
    }
}

/// Physical code, Windows virtual key, and commit text for the few keys the
/// workflows press. Enter needs the carriage-return text for a native form
/// submission; unknown keys fall through with no virtual code.
fn key_descriptor(key: &str) -> (&str, i64, Option<&'static str>) {
    match key {
        "Enter" => ("Enter", 13, Some("\r")),
        "Tab" => ("Tab", 9, None),
        "Escape" => ("Escape", 27, None),
        other => (other, 0, None),
    }
}

fn role_selector(role: &str) -> String {
    match role {
        "button" => "button, [role='button'], input[type='button'], input[type='submit']".into(),
        "link" => "a[href], [role='link']".into(),
        "menuitem" => "[role='menuitem']".into(),
        "combobox" => "select, [role='combobox']".into(),
        "option" => "option, [role='option']".into(),
        "checkbox" => "input[type='checkbox'], [role='checkbox']".into(),
        other => format!("[role='{other}']"),
    }
}

#[cfg(test)]
mod tests {
    use super::key_descriptor;

    #[test]
    fn enter_carries_the_commit_text() {
        assert_eq!(key_descriptor("Enter"), ("Enter", 13, Some("\r")));
    }

    #[test]
    fn focus_and_dismiss_keys_map_to_virtual_codes() {
        assert_eq!(key_descriptor("Tab"), ("Tab", 9, None));
        assert_eq!(key_descriptor("Escape"), ("Escape", 27, None));
        assert_eq!(key_descriptor("F1"), ("F1", 0, None));
    }
}
