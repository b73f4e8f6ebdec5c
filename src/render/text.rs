use crate::config::Config;
use crate::spec::TextOverlay;
use std::path::Path;

/// Escape text for the drawtext filter grammar. Order matters: backslashes
/// first, then the characters that terminate or delimit parameters.
pub fn escape_drawtext(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('\'', "'\\''")
        .replace(':', "\\:")
        .replace('%', "\\%")
        .replace('{', "\\{")
        .replace('}', "\\}")
}

/// Format a time for the enable expression without trailing zeros.
fn format_time(t: f64) -> String {
    let formatted = format!("{:.3}", t);
    formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

/// Build one drawtext filter for a subtitle, shifted by `delay` (fade-in
/// padding plus the voice-over start delay).
pub fn build_drawtext_filter(overlay: &TextOverlay, delay: f64, config: &Config) -> Option<String> {
    if overlay.text.is_empty() {
        return None;
    }

    let safe_text = escape_drawtext(&overlay.text);
    let start = overlay.start_time + delay;
    let end = overlay.end_time() + delay;

    let mut params = Vec::new();
    if Path::new(&config.font_file).exists() {
        params.push(format!("fontfile={}", config.font_file));
    } else {
        params.push("font=Arial".to_string());
    }
    params.push(format!("text='{}'", safe_text));
    params.push(format!("fontcolor={}", config.font_color));
    params.push(format!("fontsize={}", config.font_size));
    params.push(format!("x={}", config.text_position_x));
    params.push(format!("y={}", config.text_position_y));
    params.push(format!(
        "enable=between(t\\,{}\\,{})",
        format_time(start),
        format_time(end)
    ));

    Some(format!("drawtext={}", params.join(":")))
}
