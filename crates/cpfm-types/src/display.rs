//! Display helpers shared by every front-end

/// Lower-case the name, then upper-case the first letter of each word
///
/// Plugin names arrive in whatever casing the sender used
/// ("COOL TIMELINE", "cool timeline"); charts show them normalized.
pub fn title_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut at_word_start = true;
    for ch in name.trim().chars() {
        if ch.is_whitespace() {
            at_word_start = true;
            out.push(ch);
        } else if at_word_start {
            out.extend(ch.to_uppercase());
            at_word_start = false;
        } else {
            out.extend(ch.to_lowercase());
        }
    }
    out
}
