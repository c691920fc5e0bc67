//! Element-stream writer used by every `write_xml` in the crate.
//!
//! Output is built by pushing onto a `String`, two spaces of indentation per
//! nesting level. Attribute values are escaped; element names are trusted.

/// Accumulates an XML element stream.
#[derive(Debug, Default)]
pub struct XmlWriter {
    xml: String,
    open: Vec<&'static str>,
}

/// Attribute list for one element. Order is preserved in the output.
pub type Attrs = Vec<(&'static str, String)>;

impl XmlWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes `<name attrs...>` and descends one level.
    pub fn open(&mut self, name: &'static str, attrs: &[(&'static str, String)]) {
        self.start_tag(name, attrs);
        self.xml.push_str(">\n");
        self.open.push(name);
    }

    /// Writes `<name attrs.../>`.
    pub fn empty(&mut self, name: &'static str, attrs: &[(&'static str, String)]) {
        self.start_tag(name, attrs);
        self.xml.push_str("/>\n");
    }

    /// Closes the innermost open element.
    pub fn close(&mut self) {
        if let Some(name) = self.open.pop() {
            self.indent();
            self.xml.push_str(&format!("</{}>\n", name));
        }
    }

    /// Closes anything still open and returns the text.
    pub fn finish(mut self) -> String {
        while !self.open.is_empty() {
            self.close();
        }
        self.xml
    }

    fn start_tag(&mut self, name: &str, attrs: &[(&'static str, String)]) {
        self.indent();
        self.xml.push('<');
        self.xml.push_str(name);
        for (key, value) in attrs {
            self.xml
                .push_str(&format!(" {}=\"{}\"", key, escape_xml(value)));
        }
    }

    fn indent(&mut self) {
        for _ in 0..self.open.len() {
            self.xml.push_str("  ");
        }
    }
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
