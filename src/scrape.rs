use scraper::Html;

pub const START_MARKER: &str = "TASK [Print RACF output parts]";
pub const END_MARKER: &str = "PLAY RECAP";
const MSG_TOKEN: &str = "msg";

/// Flattens the rendered job log into plain text, one text node per line.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    document.root_element().text().collect::<Vec<_>>().join("\n")
}

/// The part of the log between the RACF print task and the play recap.
pub fn relevant_section(text: &str) -> Option<&str> {
    let start = text.find(START_MARKER)?;
    let end = start + text[start..].find(END_MARKER)?;
    Some(&text[start..end])
}

/// Keeps the message payload of every line that mentions `msg`.
pub fn clean_msg_lines(section: &str) -> Vec<String> {
    section
        .split('\n')
        .filter(|line| line.contains(MSG_TOKEN))
        .filter_map(|line| line.split(MSG_TOKEN).nth(1))
        .map(|payload| {
            payload
                .trim_matches(|c| matches!(c, ':' | ' ' | '"'))
                .to_string()
        })
        .collect()
}

pub fn extract_racf_output(html: &str) -> Option<String> {
    let text = html_to_text(html);
    let section = relevant_section(&text)?;
    Some(clean_msg_lines(section).join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const JOB_HTML: &str = r#"<!DOCTYPE html>
<html><head><title>Job 42</title></head>
<body><pre>
<span>PLAY [Query RACF] ***</span>
<span>TASK [Gathering Facts] ***</span>
<span>ok: [zos1]</span>
<span>TASK [Print RACF output parts] ***</span>
<span>ok: [zos1] =&gt; (item=1) =&gt; {</span>
<span>    "msg": "USER=IBMUSER  NAME=SYSTEM PROGRAMMER  OWNER=SYS1"</span>
<span>}</span>
<span>ok: [zos1] =&gt; (item=2) =&gt; {</span>
<span>    "msg": "DEFAULT-GROUP=SYS1 PASSDATE=00.000"</span>
<span>}</span>
<span>PLAY RECAP ***</span>
<span>zos1 : ok=2 changed=0 unreachable=0 failed=0</span>
</pre></body></html>"#;

    #[test]
    fn test_extracts_msg_payloads() {
        let cleaned = extract_racf_output(JOB_HTML).unwrap();
        assert_eq!(
            cleaned,
            "USER=IBMUSER  NAME=SYSTEM PROGRAMMER  OWNER=SYS1\nDEFAULT-GROUP=SYS1 PASSDATE=00.000"
        );
    }

    #[test]
    fn test_missing_start_marker() {
        let html = "<pre><span>\"msg\": \"x\"</span><span>PLAY RECAP</span></pre>";
        assert_eq!(extract_racf_output(html), None);
    }

    #[test]
    fn test_missing_end_marker() {
        let html = "<pre><span>TASK [Print RACF output parts]</span><span>\"msg\": \"x\"</span></pre>";
        assert_eq!(extract_racf_output(html), None);
    }

    #[test]
    fn test_end_marker_before_start_is_ignored() {
        let text = "PLAY RECAP early\nTASK [Print RACF output parts]\n\"msg\": \"a\"\nPLAY RECAP\n";
        let section = relevant_section(text).unwrap();
        assert!(section.starts_with(START_MARKER));
        assert_eq!(clean_msg_lines(section), vec!["a"]);
    }

    #[test]
    fn test_clean_keeps_text_between_first_and_second_token() {
        let lines = clean_msg_lines("  \"msg\": \"first\" msg trailing\nno token here\n");
        assert_eq!(lines, vec!["first"]);
    }

    #[test]
    fn test_section_without_messages_is_empty() {
        let html = "<pre><span>TASK [Print RACF output parts]</span><span>skipping</span><span>PLAY RECAP</span></pre>";
        assert_eq!(extract_racf_output(html), Some(String::new()));
    }

    #[test]
    fn test_text_nodes_join_with_newlines() {
        let text = html_to_text("<p><b>one</b><i>two</i></p>");
        assert!(text.contains("one\ntwo"));
    }
}
