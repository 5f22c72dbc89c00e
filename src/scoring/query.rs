use serde::Serialize;

const AND: &str = "AND";
const OR: &str = "OR";

/// Boolean structure over an interest string
///
/// Grammar: the text is split on the uppercase keyword `AND` into groups, each
/// group is split on the uppercase keyword `OR` into terms. Parentheses and
/// double quotes are ignored, terms are lowercased and whitespace-normalised,
/// and empty terms or groups are dropped. Lowercase `and`/`or` are ordinary words.
///
/// ```
/// use correspondent::scoring::ParsedQuery;
///
/// let query = ParsedQuery::parse("(genomics OR deep learning) AND aging");
/// assert_eq!(query.groups(), &[vec!["genomics", "deep learning"], vec!["aging"]]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedQuery {
    groups: Vec<Vec<String>>,
}

impl ParsedQuery {
    pub fn parse(text: &str) -> Self {
        let mut groups = Vec::new();
        let mut group: Vec<String> = Vec::new();
        let mut term: Vec<String> = Vec::new();

        for token in text.split_whitespace() {
            match token {
                AND => {
                    push_term(&mut group, &mut term);
                    push_group(&mut groups, &mut group);
                }
                OR => push_term(&mut group, &mut term),
                _ => {
                    let word: String = token
                        .chars()
                        .filter(|c| !matches!(c, '(' | ')' | '"'))
                        .collect();
                    if !word.is_empty() {
                        term.push(word.to_lowercase());
                    }
                }
            }
        }
        push_term(&mut group, &mut term);
        push_group(&mut groups, &mut group);

        Self { groups }
    }

    /// Build directly from groups of terms; terms are lowercased
    pub fn from_groups<I, G, S>(groups: I) -> Self
    where
        I: IntoIterator<Item = G>,
        G: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let groups = groups
            .into_iter()
            .map(|g| {
                g.into_iter()
                    .map(|t| t.as_ref().trim().to_lowercase())
                    .filter(|t| !t.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|g| !g.is_empty())
            .collect();
        Self { groups }
    }

    pub fn groups(&self) -> &[Vec<String>] {
        &self.groups
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

fn push_term(group: &mut Vec<String>, term: &mut Vec<String>) {
    if !term.is_empty() {
        group.push(term.join(" "));
        term.clear();
    }
}

fn push_group(groups: &mut Vec<Vec<String>>, group: &mut Vec<String>) {
    if !group.is_empty() {
        groups.push(std::mem::take(group));
    }
}
