use super::super::KnowledgeGraph;

/// Canonical node name: HTML entities decoded, surrounding whitespace removed,
/// upper-cased.
pub fn normalize_node_name(name: &str) -> String {
    let mut decoded = name.to_string();
    loop {
        let next = unescape_html(&decoded);
        if next == decoded {
            break;
        }
        decoded = next;
    }

    decoded.trim().to_uppercase()
}

/// Rewrites every node id and edge endpoint to its canonical name. Nodes that
/// collapse together are merged and their edges summed.
pub fn normalize_node_names(graph: &KnowledgeGraph) -> KnowledgeGraph {
    let mut normalized = KnowledgeGraph::new();

    for node in graph.nodes() {
        let mut node = node.clone();
        node.id = normalize_node_name(&node.id);
        normalized.upsert_node(node);
    }

    for (source, target, weight) in graph.edges() {
        normalized.add_edge(&normalize_node_name(&source), &normalize_node_name(&target), weight);
    }

    normalized
}

fn unescape_html(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('&') {
        result.push_str(&rest[..start]);
        let candidate = &rest[start..];
        match decode_entity(candidate) {
            Some((decoded, consumed)) => {
                result.push(decoded);
                rest = &candidate[consumed..];
            }
            None => {
                result.push('&');
                rest = &candidate[1..];
            }
        }
    }

    result.push_str(rest);
    result
}

/// Decodes one entity at the start of `text`, returning the character and the
/// number of bytes consumed.
fn decode_entity(text: &str) -> Option<(char, usize)> {
    let end = text.find(';')?;
    if end > 10 {
        return None;
    }
    let body = &text[1..end];

    let decoded = if let Some(number) = body.strip_prefix('#') {
        let code = match number.strip_prefix('x').or_else(|| number.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => number.parse::<u32>().ok()?,
        };
        char::from_u32(code)?
    } else {
        match body {
            "amp" => '&',
            "lt" => '<',
            "gt" => '>',
            "quot" => '"',
            "apos" => '\'',
            "nbsp" => '\u{a0}',
            _ => return None,
        }
    };

    Some((decoded, end + 1))
}
