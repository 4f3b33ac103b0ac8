//! Color and style codes embedded in Message and Exception text.
//!
//! A marker (`&`, or the legacy `§`) followed by one code character changes the
//! color and/or style of the text after it. Codes that mean nothing are kept as
//! literal text.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatColor {
    Black,
    DarkBlue,
    DarkGreen,
    DarkAqua,
    DarkRed,
    DarkPurple,
    Gold,
    Gray,
    DarkGray,
    Blue,
    Green,
    Aqua,
    Red,
    LightPurple,
    Yellow,
    White,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatStyle {
    Normal,
    Italic,
    Bold,
}

/// A run of text sharing one color and style
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyledSpan {
    pub text: String,
    pub color: ChatColor,
    pub style: ChatStyle,
}

fn is_marker(c: char) -> bool {
    c == '&' || c == '§'
}

fn color_for_code(code: char) -> Option<ChatColor> {
    let color = match code {
        '0' => ChatColor::Black,
        '1' => ChatColor::DarkBlue,
        '2' => ChatColor::DarkGreen,
        '3' => ChatColor::DarkAqua,
        '4' => ChatColor::DarkRed,
        '5' => ChatColor::DarkPurple,
        '6' => ChatColor::Gold,
        '7' => ChatColor::Gray,
        '8' => ChatColor::DarkGray,
        '9' => ChatColor::Blue,
        'a' => ChatColor::Green,
        'b' => ChatColor::Aqua,
        'c' => ChatColor::Red,
        'd' => ChatColor::LightPurple,
        'e' => ChatColor::Yellow,
        'f' | 'r' => ChatColor::White,
        _ => return None,
    };
    Some(color)
}

fn style_for_code(code: char) -> Option<ChatStyle> {
    match code {
        'r' => Some(ChatStyle::Normal),
        'o' => Some(ChatStyle::Italic),
        'l' => Some(ChatStyle::Bold),
        _ => None,
    }
}

/// Splits marked-up text into styled spans. Text starts out white and normal.
pub fn parse_styled(text: &str) -> Vec<StyledSpan> {
    let mut spans = Vec::new();
    let mut current = String::new();
    let mut color = ChatColor::White;
    let mut style = ChatStyle::Normal;

    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if is_marker(c) {
            if let Some(&code) = chars.peek() {
                let new_color = color_for_code(code);
                let new_style = style_for_code(code);

                if new_color.is_some() || new_style.is_some() {
                    if !current.is_empty() {
                        spans.push(StyledSpan {
                            text: std::mem::take(&mut current),
                            color,
                            style,
                        });
                    }
                    color = new_color.unwrap_or(color);
                    style = new_style.unwrap_or(style);
                    chars.next();
                    continue;
                }
            }
        }
        current.push(c);
    }

    if !current.is_empty() {
        spans.push(StyledSpan {
            text: current,
            color,
            style,
        });
    }
    spans
}

/// The text with all recognized codes removed
pub fn strip_markup(text: &str) -> String {
    parse_styled(text).into_iter().map(|span| span.text).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_one_white_span() {
        let spans = parse_styled("Sent 3 chunk packets");
        assert_eq!(
            spans,
            vec![StyledSpan {
                text: "Sent 3 chunk packets".to_owned(),
                color: ChatColor::White,
                style: ChatStyle::Normal,
            }]
        );
    }

    #[test]
    fn test_color_and_style_codes() {
        let spans = parse_styled("&4Uncaught server exception: &cboom");
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].color, ChatColor::DarkRed);
        assert_eq!(spans[0].text, "Uncaught server exception: ");
        assert_eq!(spans[1].color, ChatColor::Red);
        assert_eq!(spans[1].text, "boom");

        let spans = parse_styled("&7&o[Socket: Connection established]");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].color, ChatColor::Gray);
        assert_eq!(spans[0].style, ChatStyle::Italic);
    }

    #[test]
    fn test_reset_code_sets_white_and_normal() {
        let spans = parse_styled("&a&lwin&rplain");
        assert_eq!(spans[0].color, ChatColor::Green);
        assert_eq!(spans[0].style, ChatStyle::Bold);
        assert_eq!(spans[1].color, ChatColor::White);
        assert_eq!(spans[1].style, ChatStyle::Normal);
    }

    #[test]
    fn test_section_sign_marker() {
        let spans = parse_styled("§eHello");
        assert_eq!(spans[0].color, ChatColor::Yellow);
        assert_eq!(spans[0].text, "Hello");
    }

    #[test]
    fn test_unknown_and_trailing_markers_are_literal() {
        assert_eq!(strip_markup("a & b &z"), "a & b &z");
        assert_eq!(strip_markup("50%&"), "50%&");
        assert_eq!(strip_markup("&6gold &lbold"), "gold bold");
    }
}
