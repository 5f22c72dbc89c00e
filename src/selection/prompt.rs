/// Selection prompt construction
use super::SelectionPolicy;

/// A candidate that survived document reading, as shown to the model
#[derive(Debug, Clone)]
pub struct PromptEntry<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub text: &'a str,
}

/// Build the single prompt sent to the model for one selection request
///
/// Each document is cut to `max_chars` characters. The response format
/// section must stay in sync with [`super::parse::ResponseParser`].
pub fn build_prompt(
    interest: &str,
    entries: &[PromptEntry<'_>],
    policy: SelectionPolicy,
    max_selected: usize,
    max_chars: usize,
) -> String {
    let mut prompt = format!(
        "You are a highly selective research assistant. Your task is to choose between 1 and {} \
         papers from the following documents, based on their relevance to the user's interests \
         and potential impact. The user's interests are: '''{}'''\n\n\
         Be extremely conservative in your selection; it's better to choose fewer papers than more. ",
        max_selected,
        interest.trim()
    );

    match policy {
        SelectionPolicy::AllowEmpty => prompt.push_str(
            "If no paper is truly exceptional or closely related to the user's interests, \
             answer 'None' instead of selecting one.\n\n",
        ),
        SelectionPolicy::AtLeastOne => prompt.push_str(
            "If no paper seems truly exceptional or closely related to the user's interests, \
             still select the single closest one.\n\n",
        ),
    }

    prompt.push_str("Here are the documents:\n\n'''\n");
    for entry in entries {
        prompt.push_str(&format!(
            "Paper (ID: {}): {}\n{}\n\n",
            entry.id,
            entry.title.trim(),
            truncate_chars(entry.text, max_chars)
        ));
    }
    prompt.push_str(
        "'''\nPlease provide your selection in the following format:\n\
         Selected Paper IDs: [list of selected paper IDs, or 'None' if no papers are selected]\n\
         Reasoning: [brief explanation for your choices, relating them to the user's interests]",
    );

    prompt
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
