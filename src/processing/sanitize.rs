/// Remove every ASCII control character (`0x00`-`0x1F` and `0x7F`), keeping
/// everything else in order.
///
/// Servers put newlines, bells and other junk in their MOTDs, and some use
/// them to break up words so that naive substring checks don't match.
pub fn sanitize_text(text: &str) -> String {
    text.chars().filter(|&c| !is_control(c)).collect()
}

fn is_control(c: char) -> bool {
    matches!(c, '\u{00}'..='\u{1f}' | '\u{7f}')
}
