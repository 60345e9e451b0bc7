use anyhow::Result;
use headless_chrome::Tab;

/// Serialized HTML of the current page.
pub fn page_source(tab: &Tab) -> Result<String> {
    tab.get_content()
}

/// Evaluate `js` and read the result as a string, or `fallback` when it isn't one.
fn eval_string(tab: &Tab, js: &str, fallback: &str) -> Result<String> {
    let result = tab.evaluate(js, false)?;
    Ok(result
        .value
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_else(|| fallback.to_string()))
}

/// `innerText` of the first element matching `selector`, or empty.
pub fn element_text(tab: &Tab, selector: &str) -> Result<String> {
    let js_sel = serde_json::to_string(selector)?;
    eval_string(
        tab,
        &format!("(document.querySelector({js_sel}) || {{}}).innerText || ''"),
        "",
    )
}

/// Empty an input before typing into it.
pub fn clear_value(tab: &Tab, selector: &str) -> Result<()> {
    let js_sel = serde_json::to_string(selector)?;
    tab.evaluate(
        &format!("(document.querySelector({js_sel}) || {{}}).value = ''"),
        false,
    )?;
    Ok(())
}

/// Where the tab is, as `url (title)`.
pub fn location(tab: &Tab) -> Result<String> {
    let url = eval_string(tab, "window.location.href", "unknown")?;
    let title = eval_string(tab, "document.title", "")?;
    Ok(describe_location(&url, &title))
}

fn describe_location(url: &str, title: &str) -> String {
    let title = title.trim();
    if title.is_empty() {
        url.to_string()
    } else {
        format!("{url} ({title})")
    }
}
