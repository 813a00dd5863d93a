use mane_contracts::transform::{ExtractionResult, ImageRef};
use serde_json::Value;

/// Whole-string base64 guess: longer than this with no whitespace is almost
/// certainly a payload, not prose.
const WHOLE_BASE64_MIN_CHARS: usize = 1000;

/// Minimum length for a base64-alphabet run embedded inside other text.
const EMBEDDED_BASE64_MIN_CHARS: usize = 100;

const IMAGE_EXTENSIONS: [&str; 6] = [".png", ".jpg", ".jpeg", ".gif", ".webp", ".bmp"];

/// Recovers an image or text result from an arbitrary backend response.
///
/// Strategies run in priority order, strictest signal first; each is tried
/// only when its predecessors found nothing. This function never fails: an
/// unrecognized shape degrades to `Text` or `NotFound`.
pub fn extract(raw: &Value) -> ExtractionResult {
    // Strategy 1: structured image list.
    if let Some(image) = from_image_list(raw) {
        return ExtractionResult::Image(image);
    }

    // Strategy 2: structured content list (or a plain content string, which
    // feeds strategy 3 directly).
    match content_candidate(raw) {
        Candidate::Image(image) => ExtractionResult::Image(image),
        Candidate::Text(text) => scan_text(&text),
        Candidate::None => match raw {
            Value::String(text) => scan_text(text),
            _ => ExtractionResult::NotFound,
        },
    }
}

enum Candidate {
    Image(ImageRef),
    Text(String),
    None,
}

fn from_image_list(raw: &Value) -> Option<ImageRef> {
    let entries = locate_image_entries(raw)?;
    image_from_entry(entries.first()?)
}

fn locate_image_entries(raw: &Value) -> Option<&Vec<Value>> {
    let candidates = [
        raw.pointer("/data/images"),
        raw.get("images"),
        raw.get("data"),
        raw.get("output"),
    ];
    candidates
        .into_iter()
        .flatten()
        .filter_map(Value::as_array)
        .find(|rows| !rows.is_empty())
}

fn image_from_entry(entry: &Value) -> Option<ImageRef> {
    match entry {
        Value::String(text) => image_from_string(text.trim()),
        Value::Object(obj) => {
            if let Some(url) = obj
                .get("image")
                .and_then(|nested| nested.get("url"))
                .and_then(Value::as_str)
            {
                return image_from_string(url.trim());
            }
            if let Some(url) = obj.get("url").and_then(Value::as_str) {
                return image_from_string(url.trim());
            }
            for key in ["b64_json", "base64", "image_base64"] {
                if let Some(data) = obj.get(key).and_then(Value::as_str) {
                    return image_from_string(data.trim());
                }
            }
            // No known field name matched: accept the first string value
            // that looks like an image reference.
            for value in obj.values() {
                let Some(text) = value.as_str() else {
                    continue;
                };
                let trimmed = text.trim();
                if trimmed.starts_with("http") {
                    return Some(ImageRef::hosted_url(trimmed));
                }
                if trimmed.starts_with("data:image") {
                    if let Some(image) = ImageRef::from_data_uri(trimmed) {
                        return Some(image);
                    }
                }
                if trimmed.len() > WHOLE_BASE64_MIN_CHARS
                    && !trimmed.chars().any(char::is_whitespace)
                {
                    return Some(ImageRef::data_uri("image/png", trimmed));
                }
            }
            None
        }
        _ => None,
    }
}

/// Classifies a string-valued image entry by prefix; anything that is neither
/// a URL nor a data URI is treated as bare base64 with an assumed PNG type.
fn image_from_string(text: &str) -> Option<ImageRef> {
    if text.is_empty() {
        return None;
    }
    if text.starts_with("http") {
        return Some(ImageRef::hosted_url(text));
    }
    if text.starts_with("data:") {
        return ImageRef::from_data_uri(text);
    }
    let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    Some(ImageRef::data_uri("image/png", cleaned))
}

fn content_candidate(raw: &Value) -> Candidate {
    let Some(content) = raw.pointer("/choices/0/message/content") else {
        return Candidate::None;
    };
    match content {
        Value::String(text) => Candidate::Text(text.clone()),
        Value::Array(segments) => {
            let mut first_text: Option<&str> = None;
            for segment in segments {
                if let Some(image) = image_from_segment(segment) {
                    return Candidate::Image(image);
                }
                if first_text.is_none() && segment.get("type").and_then(Value::as_str) == Some("text")
                {
                    first_text = segment.get("text").and_then(Value::as_str);
                }
            }
            match first_text {
                Some(text) => Candidate::Text(text.to_string()),
                None => Candidate::None,
            }
        }
        _ => Candidate::None,
    }
}

fn image_from_segment(segment: &Value) -> Option<ImageRef> {
    match segment.get("type").and_then(Value::as_str) {
        Some("image_url") => {
            let url = segment
                .pointer("/image_url/url")
                .and_then(Value::as_str)?
                .trim();
            image_from_string(url)
        }
        Some("image") => {
            let source = segment.get("source")?;
            let data = source.get("data").and_then(Value::as_str)?.trim();
            if data.is_empty() {
                return None;
            }
            let mime = source
                .get("media_type")
                .and_then(Value::as_str)
                .unwrap_or("image/png");
            Some(ImageRef::data_uri(mime, data))
        }
        _ => {
            // Provider-specific inline data, seen in both casings.
            let inline = segment
                .get("inline_data")
                .or_else(|| segment.get("inlineData"))?;
            let data = inline.get("data").and_then(Value::as_str)?.trim();
            if data.is_empty() {
                return None;
            }
            let mime = inline
                .get("mime_type")
                .or_else(|| inline.get("mimeType"))
                .and_then(Value::as_str)
                .unwrap_or("image/png");
            Some(ImageRef::data_uri(mime, data))
        }
    }
}

/// Strategy 3: recover an image reference from freeform model text, falling
/// back to `Text` when the string carries no image signal at all.
fn scan_text(text: &str) -> ExtractionResult {
    if text.trim().is_empty() {
        return ExtractionResult::NotFound;
    }
    if let Some(image) = data_uri_in_text(text) {
        return ExtractionResult::Image(image);
    }
    if let Some(image) = image_extension_url(text) {
        return ExtractionResult::Image(image);
    }
    if let Some(image) = whole_string_base64(text) {
        return ExtractionResult::Image(image);
    }
    if let Some(image) = embedded_base64_run(text) {
        return ExtractionResult::Image(image);
    }
    if let Some(url) = url_tokens(text).into_iter().next() {
        return ExtractionResult::Image(ImageRef::hosted_url(url));
    }
    ExtractionResult::Text(text.to_string())
}

/// Finds a `data:image/...;base64,...` span anywhere in the text, tolerating
/// whitespace wrapped into the base64 portion.
fn data_uri_in_text(text: &str) -> Option<ImageRef> {
    let start = text.find("data:image/")?;
    let after = &text[start + "data:image/".len()..];
    let semi = after.find(";base64,")?;
    let subtype = &after[..semi];
    if subtype.is_empty()
        || !subtype
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '+' | '-'))
    {
        return None;
    }

    // The payload is the maximal run of base64-alphabet characters and
    // whitespace, with the whitespace stripped; wrapped lines of any length
    // survive intact. Padding ends the payload, so whitespace after a `=`
    // stops the run before trailing prose.
    let mut payload = String::new();
    let mut padded = false;
    for c in after[semi + ";base64,".len()..].chars() {
        if c.is_whitespace() {
            if padded {
                break;
            }
            continue;
        }
        if !is_base64_char(c) || (padded && c != '=') {
            break;
        }
        if c == '=' {
            padded = true;
        }
        payload.push(c);
    }
    if payload.is_empty() {
        return None;
    }
    Some(ImageRef::data_uri(format!("image/{subtype}"), payload))
}

fn image_extension_url(text: &str) -> Option<ImageRef> {
    for url in url_tokens(text) {
        let path = url.split(['?', '#']).next().unwrap_or(&url);
        let lowered = path.to_ascii_lowercase();
        if IMAGE_EXTENSIONS.iter().any(|ext| lowered.ends_with(ext)) {
            return Some(ImageRef::hosted_url(url));
        }
    }
    None
}

fn whole_string_base64(text: &str) -> Option<ImageRef> {
    let trimmed = text.trim();
    if trimmed.len() > WHOLE_BASE64_MIN_CHARS && trimmed.chars().all(is_base64_char) {
        return Some(ImageRef::data_uri("image/png", trimmed));
    }
    None
}

fn embedded_base64_run(text: &str) -> Option<ImageRef> {
    let mut run_start: Option<usize> = None;
    for (idx, c) in text.char_indices() {
        if is_base64_char(c) {
            run_start.get_or_insert(idx);
            continue;
        }
        if let Some(start) = run_start.take() {
            if idx - start >= EMBEDDED_BASE64_MIN_CHARS {
                return Some(ImageRef::data_uri("image/png", &text[start..idx]));
            }
        }
    }
    if let Some(start) = run_start {
        if text.len() - start >= EMBEDDED_BASE64_MIN_CHARS {
            return Some(ImageRef::data_uri("image/png", &text[start..]));
        }
    }
    None
}

/// All `http(s)://...` tokens in the text, with trailing prose punctuation
/// trimmed.
fn url_tokens(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for (idx, _) in text.match_indices("http") {
        let rest = &text[idx..];
        if !rest.starts_with("http://") && !rest.starts_with("https://") {
            continue;
        }
        let end = rest
            .find(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | '<' | '>' | ')' | ']'))
            .unwrap_or(rest.len());
        let token = rest[..end].trim_end_matches(['.', ',', ';', ':']);
        if token.len() > "https://".len() && !out.iter().any(|existing| existing == token) {
            out.push(token.to_string());
        }
    }
    out
}

fn is_base64_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=')
}

#[cfg(test)]
mod tests {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use mane_contracts::transform::{ExtractionResult, ImageRef};
    use serde_json::json;

    use super::extract;

    fn expect_image(result: ExtractionResult) -> ImageRef {
        match result {
            ExtractionResult::Image(image) => image,
            other => panic!("expected image, got {other:?}"),
        }
    }

    fn long_base64(len: usize) -> String {
        "QUJDRA".chars().cycle().take(len).collect()
    }

    #[test]
    fn image_list_string_entry_http_is_hosted_url() {
        let raw = json!({"data": {"images": ["https://cdn.example.com/result.png"]}});
        let image = expect_image(extract(&raw));
        assert_eq!(image, ImageRef::hosted_url("https://cdn.example.com/result.png"));
    }

    #[test]
    fn image_list_string_entry_data_uri_is_parsed() {
        let raw = json!({"images": ["data:image/jpeg;base64,aGVsbG8="]});
        let image = expect_image(extract(&raw));
        assert_eq!(image, ImageRef::data_uri("image/jpeg", "aGVsbG8="));
    }

    #[test]
    fn image_list_string_entry_bare_base64_assumes_png() {
        let raw = json!({"images": ["aGVsbG8gd29ybGQ="]});
        let image = expect_image(extract(&raw));
        assert_eq!(image, ImageRef::data_uri("image/png", "aGVsbG8gd29ybGQ="));
    }

    #[test]
    fn image_list_object_entry_nested_url_field() {
        let raw = json!({"data": {"images": [{"image": {"url": "https://cdn.example.com/a.webp"}}]}});
        let image = expect_image(extract(&raw));
        assert_eq!(image, ImageRef::hosted_url("https://cdn.example.com/a.webp"));
    }

    #[test]
    fn image_list_object_entry_bare_url_field() {
        let raw = json!({"data": {"images": [{"url": "https://cdn.example.com/a.png", "width": 1024}]}});
        let image = expect_image(extract(&raw));
        assert_eq!(image, ImageRef::hosted_url("https://cdn.example.com/a.png"));
    }

    #[test]
    fn image_list_object_entry_base64_field_variants() {
        for key in ["b64_json", "base64", "image_base64"] {
            let raw = json!({"images": [{key: "aGVsbG8="}]});
            let image = expect_image(extract(&raw));
            assert_eq!(image, ImageRef::data_uri("image/png", "aGVsbG8="), "field {key}");
        }
    }

    #[test]
    fn image_list_object_entry_unknown_long_field_heuristic() {
        let payload = long_base64(1200);
        let raw = json!({"images": [{"mystery_field": payload}]});
        let image = expect_image(extract(&raw));
        assert_eq!(image, ImageRef::data_uri("image/png", payload));
    }

    #[test]
    fn image_list_object_entry_short_prose_fields_do_not_match() {
        let raw = json!({"images": [{"caption": "a person with short hair"}]});
        assert_eq!(extract(&raw), ExtractionResult::NotFound);
    }

    #[test]
    fn url_field_wins_over_base64_field_in_same_entry() {
        let raw = json!({"data": {"images": [{
            "image": {"url": "https://cdn.example.com/first.png"},
            "b64_json": "aGVsbG8=",
        }]}});
        let image = expect_image(extract(&raw));
        assert_eq!(image, ImageRef::hosted_url("https://cdn.example.com/first.png"));
    }

    #[test]
    fn content_segment_image_url() {
        let raw = json!({"choices": [{"message": {"content": [
            {"type": "text", "text": "here you go"},
            {"type": "image_url", "image_url": {"url": "https://cdn.example.com/out.png"}},
        ]}}]});
        let image = expect_image(extract(&raw));
        assert_eq!(image, ImageRef::hosted_url("https://cdn.example.com/out.png"));
    }

    #[test]
    fn content_segment_inline_source_image() {
        let raw = json!({"choices": [{"message": {"content": [
            {"type": "image", "source": {"data": "aGVsbG8=", "media_type": "image/webp"}},
        ]}}]});
        let image = expect_image(extract(&raw));
        assert_eq!(image, ImageRef::data_uri("image/webp", "aGVsbG8="));
    }

    #[test]
    fn content_segment_inline_data_both_casings() {
        let snake = json!({"choices": [{"message": {"content": [
            {"inline_data": {"data": "aGVsbG8=", "mime_type": "image/jpeg"}},
        ]}}]});
        assert_eq!(
            expect_image(extract(&snake)),
            ImageRef::data_uri("image/jpeg", "aGVsbG8=")
        );

        let camel = json!({"choices": [{"message": {"content": [
            {"inlineData": {"data": "aGVsbG8=", "mimeType": "image/jpeg"}},
        ]}}]});
        assert_eq!(
            expect_image(extract(&camel)),
            ImageRef::data_uri("image/jpeg", "aGVsbG8=")
        );
    }

    #[test]
    fn content_segments_without_image_fall_through_to_text_scan() {
        let raw = json!({"choices": [{"message": {"content": [
            {"type": "text", "text": "see https://cdn.example.com/result.jpeg for the output"},
        ]}}]});
        let image = expect_image(extract(&raw));
        assert_eq!(image, ImageRef::hosted_url("https://cdn.example.com/result.jpeg"));
    }

    #[test]
    fn content_string_with_wrapped_data_uri_strips_whitespace() {
        let bytes = b"fake image payload for the wrap test!";
        let encoded = BASE64.encode(bytes);
        assert!(encoded.ends_with('='), "padded payload stops before the trailing prose");
        let (head, tail) = encoded.split_at(12);
        let reply = format!("Here is your new look!\ndata:image/png;base64,{head}\n{tail}\nEnjoy.");
        let raw = json!({"choices": [{"message": {"content": reply}}]});

        let image = expect_image(extract(&raw));
        match image {
            ImageRef::DataUri { mime_type, base64 } => {
                assert_eq!(mime_type, "image/png");
                assert_eq!(base64, encoded);
                assert_eq!(BASE64.decode(base64).unwrap(), bytes);
            }
            other => panic!("expected data uri, got {other:?}"),
        }
    }

    #[test]
    fn wrapped_data_uri_keeps_short_unpadded_tail() {
        // 60 bytes encode to 80 unpadded chars; wrapping at the usual 76-char
        // line width leaves a 4-char final line that must survive intact.
        let bytes: Vec<u8> = (0u8..60).collect();
        let encoded = BASE64.encode(&bytes);
        assert!(!encoded.contains('='));
        let (head, tail) = encoded.split_at(76);
        let reply = format!("data:image/png;base64,{head}\n{tail}");
        let raw = json!({"choices": [{"message": {"content": reply}}]});

        let image = expect_image(extract(&raw));
        match image {
            ImageRef::DataUri { base64, .. } => {
                assert_eq!(base64, encoded);
                assert_eq!(BASE64.decode(base64).unwrap(), bytes);
            }
            other => panic!("expected data uri, got {other:?}"),
        }
    }

    #[test]
    fn plain_prose_returns_full_text_never_not_found() {
        let prose = "I cannot generate images directly, but a layered bob would suit you.";
        let raw = json!({"choices": [{"message": {"content": prose}}]});
        assert_eq!(extract(&raw), ExtractionResult::Text(prose.to_string()));
    }

    #[test]
    fn whole_string_long_base64_is_wrapped_as_png() {
        let payload = long_base64(1500);
        let raw = json!({"choices": [{"message": {"content": payload}}]});
        let image = expect_image(extract(&raw));
        assert_eq!(image, ImageRef::data_uri("image/png", payload));
    }

    #[test]
    fn short_whole_string_base64_is_not_misread() {
        let payload = long_base64(400);
        let raw = json!({"choices": [{"message": {"content": payload.clone()}}]});
        // 400 chars is below the whole-string bar but above the embedded-run
        // bar, so the run scan still claims it.
        let image = expect_image(extract(&raw));
        assert_eq!(image, ImageRef::data_uri("image/png", payload));
    }

    #[test]
    fn embedded_base64_run_inside_prose() {
        let payload = long_base64(150);
        let reply = format!("The result is encoded below.\n\n{payload}\n\nLet me know!");
        let raw = json!({"choices": [{"message": {"content": reply}}]});
        let image = expect_image(extract(&raw));
        assert_eq!(image, ImageRef::data_uri("image/png", payload));
    }

    #[test]
    fn bare_url_without_image_extension_is_last_resort() {
        let raw = json!({"choices": [{"message": {"content":
            "Your image is ready at https://files.example.com/v1/outputs/abc123 now."}}]});
        let image = expect_image(extract(&raw));
        assert_eq!(
            image,
            ImageRef::hosted_url("https://files.example.com/v1/outputs/abc123")
        );
    }

    #[test]
    fn data_uri_beats_bare_url_in_same_text() {
        let reply = "See https://docs.example.com/help — data:image/gif;base64,aGVsbG8= done";
        let raw = json!({"choices": [{"message": {"content": reply}}]});
        let image = expect_image(extract(&raw));
        assert_eq!(image, ImageRef::data_uri("image/gif", "aGVsbG8="));
    }

    #[test]
    fn empty_or_missing_content_is_not_found() {
        assert_eq!(extract(&json!({})), ExtractionResult::NotFound);
        assert_eq!(extract(&json!(null)), ExtractionResult::NotFound);
        assert_eq!(
            extract(&json!({"choices": [{"message": {"content": ""}}]})),
            ExtractionResult::NotFound
        );
        assert_eq!(
            extract(&json!({"choices": [{"message": {"content": []}}]})),
            ExtractionResult::NotFound
        );
        assert_eq!(
            extract(&json!({"choices": [{"message": {}}]})),
            ExtractionResult::NotFound
        );
    }

    #[test]
    fn structured_image_list_wins_over_content_scan() {
        let raw = json!({
            "data": {"images": [{"url": "https://cdn.example.com/from-list.png"}]},
            "choices": [{"message": {"content": "https://cdn.example.com/from-text.png"}}],
        });
        let image = expect_image(extract(&raw));
        assert_eq!(image, ImageRef::hosted_url("https://cdn.example.com/from-list.png"));
    }

    #[test]
    fn top_level_string_response_is_scanned() {
        let raw = json!("nothing but prose in this one");
        assert_eq!(
            extract(&raw),
            ExtractionResult::Text("nothing but prose in this one".to_string())
        );
    }

    #[test]
    fn round_trip_preserves_bytes() {
        let bytes: Vec<u8> = (0u8..=255).cycle().take(600).collect();
        let raw = json!({"data": {"images": [{"b64_json": BASE64.encode(&bytes)}]}});
        let image = expect_image(extract(&raw));
        match image {
            ImageRef::DataUri { base64, .. } => {
                assert_eq!(BASE64.decode(base64).unwrap(), bytes);
            }
            other => panic!("expected data uri, got {other:?}"),
        }
    }
}
