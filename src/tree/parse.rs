use super::{AnnotatedTree, Annotation, NodeId, ROOT};
use crate::dictionary::TokenDictionary;
use crate::error::{GrammarError, GrammarResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Open,
    Close,
    Atom(&'a str),
}

fn tokenize(line: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;
    for (i, c) in line.char_indices() {
        if c == '(' || c == ')' || c.is_whitespace() {
            if let Some(s) = start.take() {
                tokens.push(Token::Atom(&line[s..i]));
            }
            match c {
                '(' => tokens.push(Token::Open),
                ')' => tokens.push(Token::Close),
                _ => {}
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        tokens.push(Token::Atom(&line[s..]));
    }
    tokens
}

/// `#<digits>`: a variable leaf in a tree, a variable reference in a string.
pub fn variable_index(token: &str) -> Option<usize> {
    let digits = token.strip_prefix('#')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Parses one bracketed tree. Source words are lower-cased and numbered left
/// to right; a `#<n>` leaf becomes a split node without a word.
///
/// Lines without any label (empty, `()`, `(())`) come back as a parse
/// failure placeholder rather than an error. A wrapping unlabeled bracket, as
/// in `( (S ...) )`, is accepted.
pub fn parse_tree(line: &str, line_no: usize, dict: &mut TokenDictionary) -> GrammarResult<AnnotatedTree> {
    let tokens = tokenize(line);
    if !tokens.iter().any(|t| matches!(t, Token::Atom(_))) {
        return Ok(AnnotatedTree::parse_failure());
    }

    let mut tree: Option<AnnotatedTree> = None;
    let mut stack: Vec<NodeId> = Vec::new();
    let mut wrappers = 0usize;
    let mut word_index = 0usize;
    let mut i = 0;

    while i < tokens.len() {
        match tokens[i] {
            Token::Open => {
                let tag = match tokens.get(i + 1) {
                    Some(Token::Atom(tag)) => *tag,
                    Some(Token::Open) if tree.is_none() && stack.is_empty() => {
                        wrappers += 1;
                        i += 1;
                        continue;
                    }
                    _ => return Err(GrammarError::parse(line_no, "expected a label after '('")),
                };
                let tag = dict.index(tag);
                let id = if let Some(t) = tree.as_mut() {
                    let Some(&parent) = stack.last() else {
                        return Err(GrammarError::parse(line_no, "more than one root"));
                    };
                    if t.node(parent).word.is_some() {
                        return Err(GrammarError::parse(line_no, "node has both a word and children"));
                    }
                    t.add_child(parent, tag)
                } else {
                    tree = Some(AnnotatedTree::new(tag));
                    ROOT
                };
                stack.push(id);
                i += 2;
            }
            Token::Close => {
                if stack.pop().is_none() {
                    if wrappers == 0 {
                        return Err(GrammarError::parse(line_no, "unbalanced ')'"));
                    }
                    wrappers -= 1;
                }
                i += 1;
            }
            Token::Atom(atom) => {
                let (Some(t), Some(&top)) = (&mut tree, stack.last()) else {
                    return Err(GrammarError::parse(line_no, format!("stray token '{}'", atom)));
                };
                let node = t.node(top);
                if !node.is_leaf() || node.word.is_some() || node.is_split() {
                    return Err(GrammarError::parse(line_no, format!("unexpected token '{}'", atom)));
                }
                if variable_index(atom).is_some() {
                    t.set_annotation(top, Annotation { split: true, span: None });
                } else {
                    let word = dict.index(&atom.to_lowercase());
                    t.set_word(top, word, word_index);
                    word_index += 1;
                }
                i += 1;
            }
        }
    }

    if !stack.is_empty() || wrappers > 0 {
        return Err(GrammarError::parse(line_no, "unbalanced '('"));
    }
    Ok(tree.unwrap_or_else(AnnotatedTree::parse_failure))
}
