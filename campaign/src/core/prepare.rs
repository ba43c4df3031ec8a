//! Shell preparation of planned command text.

const SCRIPT_OPTION: &str = "--script";

/// Quote the value of a `--script` option when the command carries a `*`
/// wildcard, so the remote shell passes the pattern through as one argument.
///
/// Handles both `--script=value` and `--script value`. Commands without the
/// option or without a wildcard pass through unchanged.
pub fn prepare_command(command: &str) -> String {
    if !command.contains(SCRIPT_OPTION) || !command.contains('*') {
        return command.to_string();
    }

    let tokens = token_spans(command);
    // Byte ranges of option values to wrap in quotes, in order.
    let mut values = Vec::new();
    let mut idx = 0;
    while idx < tokens.len() {
        let (start, end) = tokens[idx];
        let token = &command[start..end];
        if token.starts_with("--script=") {
            values.push((start + SCRIPT_OPTION.len() + 1, end));
        } else if token == SCRIPT_OPTION
            && let Some(&next) = tokens.get(idx + 1)
        {
            values.push(next);
            idx += 1;
        }
        idx += 1;
    }

    let mut prepared = String::with_capacity(command.len() + 2 * values.len());
    let mut copied = 0;
    for (start, end) in values {
        let value = &command[start..end];
        if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
            continue;
        }
        prepared.push_str(&command[copied..start]);
        prepared.push('"');
        prepared.push_str(value);
        prepared.push('"');
        copied = end;
    }
    prepared.push_str(&command[copied..]);
    prepared
}

/// Byte ranges of the whitespace-separated tokens of `text`.
fn token_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (idx, ch) in text.char_indices() {
        match (ch.is_whitespace(), start) {
            (true, Some(begin)) => {
                spans.push((begin, idx));
                start = None;
            }
            (false, None) => start = Some(idx),
            _ => {}
        }
    }
    if let Some(begin) = start {
        spans.push((begin, text.len()));
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip_quotes(text: &str) -> String {
        text.replace('"', "")
    }

    #[test]
    fn quotes_equals_form() {
        let input = "nmap --script=vuln* -p 80 10.0.0.1";
        let prepared = prepare_command(input);
        assert_eq!(prepared, "nmap --script=\"vuln*\" -p 80 10.0.0.1");
        assert_eq!(strip_quotes(&prepared), input);
    }

    #[test]
    fn quotes_following_token() {
        let input = "nmap -sV --script smb-vuln* 10.0.0.1";
        let prepared = prepare_command(input);
        assert_eq!(prepared, "nmap -sV --script \"smb-vuln*\" 10.0.0.1");
        assert_eq!(strip_quotes(&prepared), input);
    }

    #[test]
    fn leaves_commands_without_wildcard_alone() {
        let input = "nmap  --script  default 10.0.0.1";
        assert_eq!(prepare_command(input), input);
        assert_eq!(prepare_command("ls *.txt"), "ls *.txt");
    }

    #[test]
    fn does_not_double_quote() {
        let input = "nmap --script \"http-*\" 10.0.0.1";
        assert_eq!(prepare_command(input), input);
    }

    #[test]
    fn keeps_original_spacing() {
        let input = "nmap  -sV   --script vuln*\t10.0.0.1";
        let prepared = prepare_command(input);
        assert_eq!(prepared, "nmap  -sV   --script \"vuln*\"\t10.0.0.1");
        assert_eq!(strip_quotes(&prepared), input);
    }

    #[test]
    fn trailing_option_without_value_is_untouched() {
        let input = "echo * --script";
        assert_eq!(prepare_command(input), input);
    }
}
