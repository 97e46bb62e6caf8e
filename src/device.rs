use axum::http::HeaderMap;
use woothee::parser::Parser;

/// Classify the `User-Agent` header into the device names used for
/// targeting: `mobile`, `desktop`, `bot` or `unknown`.
pub fn device_from_headers(headers: &HeaderMap) -> String {
    let ua = headers.get("user-agent").and_then(|v| v.to_str().ok());
    classify(ua).to_owned()
}

/// Map a woothee category onto a device name.
pub fn classify(ua: Option<&str>) -> &'static str {
    let ua = match ua {
        Some(s) if !s.is_empty() => s,
        _ => return "unknown",
    };

    let parser = Parser::new();
    match parser.parse(ua) {
        Some(result) => match result.category {
            "smartphone" | "mobilephone" => "mobile",
            "pc" => "desktop",
            "crawler" => "bot",
            _ => "unknown",
        },
        None => "unknown",
    }
}
