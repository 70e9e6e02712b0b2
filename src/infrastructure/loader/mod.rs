mod xml;

pub use xml::{pretty_print, XmlDocumentLoader};
