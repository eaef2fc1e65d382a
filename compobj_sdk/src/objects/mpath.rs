//! `multipath.conf` parser and renderer
//!
//! The file is a tree of named blocks (`defaults { ... }`, `devices { device
//! { ... } }`) holding `attribute value` lines. Comments are not preserved on
//! rewrite.

/// One `name { ... }` block; the root block has an empty name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Block {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Block>,
}

/// Strip one pair of surrounding double quotes
pub fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn quote(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '/' | ':' | '.'));
    if plain {
        value.to_string()
    } else {
        format!("\"{}\"", value)
    }
}

/// Cut a trailing `#` or `!` comment that is not inside quotes
fn strip_comment(line: &str) -> &str {
    let mut quoted = false;
    for (i, c) in line.char_indices() {
        match c {
            '"' => quoted = !quoted,
            '#' | '!' if !quoted => return &line[..i],
            _ => {}
        }
    }
    line
}

impl Block {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Parse a whole file into a root block
    pub fn parse(text: &str) -> Result<Self, String> {
        let mut stack = vec![Block::default()];

        for (number, raw) in text.lines().enumerate() {
            let line = strip_comment(raw).trim();
            if line.is_empty() {
                continue;
            }
            if line == "}" {
                if stack.len() < 2 {
                    return Err(format!("line {}: unbalanced '}}'", number + 1));
                }
                if let Some(done) = stack.pop() {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(done);
                    }
                }
                continue;
            }
            if let Some(head) = line.strip_suffix('{') {
                let name = head.trim();
                if name.is_empty() || name.contains(char::is_whitespace) {
                    return Err(format!("line {}: invalid block header '{}'", number + 1, line));
                }
                stack.push(Block::new(name));
                continue;
            }
            let (attr, value) = match line.find(char::is_whitespace) {
                Some(pos) => (&line[..pos], line[pos..].trim()),
                None => (line, ""),
            };
            if let Some(current) = stack.last_mut() {
                current.attrs.push((attr.to_string(), value.to_string()));
            }
        }

        if stack.len() != 1 {
            return Err(format!("block '{}' is not closed", stack.last().map_or("", |b| b.name.as_str())));
        }
        stack.pop().ok_or_else(|| "empty block stack".to_string())
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (attr, value) in &self.attrs {
            out.push_str(&format!("{} {}\n", attr, value));
        }
        for child in &self.children {
            child.render_into(&mut out, 0);
        }
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        let indent = "\t".repeat(depth);
        out.push_str(&format!("{}{} {{\n", indent, self.name));
        for (attr, value) in &self.attrs {
            if value.is_empty() {
                out.push_str(&format!("{}\t{}\n", indent, attr));
            } else {
                out.push_str(&format!("{}\t{} {}\n", indent, attr, value));
            }
        }
        for child in &self.children {
            child.render_into(out, depth + 1);
        }
        out.push_str(&format!("{}}}\n", indent));
    }

    /// Every value of `attr`, unquoted
    pub fn values(&self, attr: &str) -> Vec<&str> {
        self.attrs
            .iter()
            .filter(|(name, _)| name == attr)
            .map(|(_, value)| unquote(value))
            .collect()
    }

    pub fn value(&self, attr: &str) -> Option<&str> {
        self.values(attr).into_iter().next()
    }

    /// Replace the first `attr` line, or add one
    pub fn set(&mut self, attr: &str, value: &str) {
        let quoted = quote(value);
        match self.attrs.iter_mut().find(|(name, _)| name == attr) {
            Some(existing) => existing.1 = quoted,
            None => self.attrs.push((attr.to_string(), quoted)),
        }
    }

    /// Add an `attr` line even if the attribute already has values
    pub fn push(&mut self, attr: &str, value: &str) {
        self.attrs.push((attr.to_string(), quote(value)));
    }

    pub fn child(&self, name: &str) -> Option<&Block> {
        self.children.iter().find(|child| child.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> &mut Block {
        let pos = match self.children.iter().position(|child| child.name == name) {
            Some(pos) => pos,
            None => {
                self.children.push(Block::new(name));
                self.children.len() - 1
            }
        };
        &mut self.children[pos]
    }

    /// First child named `name` whose attributes include every `(attr, value)`
    pub fn find(&self, name: &str, selector: &[(&str, &str)]) -> Option<&Block> {
        self.children
            .iter()
            .find(|child| child.name == name && child.selected_by(selector))
    }

    /// Like [`Block::find`], creating the child with the selector attributes
    pub fn find_mut(&mut self, name: &str, selector: &[(&str, &str)]) -> &mut Block {
        let pos = match self
            .children
            .iter()
            .position(|child| child.name == name && child.selected_by(selector))
        {
            Some(pos) => pos,
            None => {
                let mut block = Block::new(name);
                for (attr, value) in selector {
                    block.set(attr, value);
                }
                self.children.push(block);
                self.children.len() - 1
            }
        };
        &mut self.children[pos]
    }

    fn selected_by(&self, selector: &[(&str, &str)]) -> bool {
        selector
            .iter()
            .all(|(attr, value)| self.value(attr) == Some(*value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONF: &str = r#"
# device mapper multipath
defaults {
	user_friendly_names yes
	polling_interval 10 # seconds
}
blacklist {
	devnode "^(ram|raw|loop)[0-9]*"
	wwid 36001405a
}
devices {
	device {
		vendor "HP"
		product "OPEN-.*"
		path_grouping_policy multibus
	}
}
"#;

    #[test]
    fn test_parse_tree() {
        let root = Block::parse(CONF).unwrap();
        let defaults = root.child("defaults").unwrap();
        assert_eq!(defaults.value("polling_interval"), Some("10"));
        assert_eq!(
            root.child("blacklist").unwrap().values("devnode"),
            vec!["^(ram|raw|loop)[0-9]*"]
        );

        let device = root
            .child("devices")
            .unwrap()
            .find("device", &[("vendor", "HP"), ("product", "OPEN-.*")])
            .unwrap();
        assert_eq!(device.value("path_grouping_policy"), Some("multibus"));
    }

    #[test]
    fn test_render_round_trip() {
        let root = Block::parse(CONF).unwrap();
        let text = root.render();
        assert!(text.starts_with("defaults {\n\tuser_friendly_names yes\n"));
        assert!(text.contains("\tdevice {\n\t\tvendor \"HP\"\n"));
        assert_eq!(Block::parse(&text).unwrap(), root);
    }

    #[test]
    fn test_edit_creates_blocks() {
        let mut root = Block::default();
        root.child_mut("defaults").set("polling_interval", "5");
        root.child_mut("multipaths")
            .find_mut("multipath", &[("wwid", "3600508b4")])
            .set("alias", "data01");
        root.child_mut("blacklist").push("devnode", "^sd[a]$");

        assert_eq!(
            root.render(),
            "defaults {\n\tpolling_interval 5\n}\n\
             multipaths {\n\tmultipath {\n\t\twwid 3600508b4\n\t\talias data01\n\t}\n}\n\
             blacklist {\n\tdevnode \"^sd[a]$\"\n}\n"
        );
    }

    #[test]
    fn test_unbalanced() {
        assert!(Block::parse("defaults {\n").is_err());
        assert!(Block::parse("}\n").is_err());
    }
}
