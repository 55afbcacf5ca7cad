use std::fmt;

use crate::protocol::TypeCode;

/// A single complete type in a signature.
///
/// Container types own their children, so a node is the root of the tree
/// describing one value. A sequence of nodes describes a message body.
///
/// # Examples
///
/// ```
/// use wirebus::signature::{self, TypeNode};
///
/// let (node, rest) = signature::parse_one("a{sv}u")?;
/// assert!(matches!(node, TypeNode::Dict(..)));
/// assert_eq!(rest, "u");
/// assert_eq!(node.to_string(), "a{sv}");
/// # Ok::<_, wirebus::SignatureError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeNode {
    /// A basic type, including `v` for variants.
    Basic(TypeCode),
    /// An array of the element type.
    Array(Box<TypeNode>),
    /// A struct with one or more fields.
    Struct(Vec<TypeNode>),
    /// A dictionary with a basic key type and an arbitrary value type,
    /// carried on the wire as an array of 8-aligned entries.
    Dict(TypeCode, Box<TypeNode>),
}

impl TypeNode {
    /// The natural alignment of a value of this type.
    pub fn alignment(&self) -> usize {
        match self {
            TypeNode::Basic(code) => code.alignment(),
            TypeNode::Array(..) | TypeNode::Dict(..) => 4,
            TypeNode::Struct(..) => 8,
        }
    }

    /// Render the canonical signature of this node into `out`.
    pub(crate) fn render_to(&self, out: &mut String) {
        match self {
            TypeNode::Basic(code) => out.push(char::from(code.0)),
            TypeNode::Array(element) => {
                out.push('a');
                element.render_to(out);
            }
            TypeNode::Struct(fields) => {
                out.push('(');

                for field in fields {
                    field.render_to(out);
                }

                out.push(')');
            }
            TypeNode::Dict(key, value) => {
                out.push_str("a{");
                out.push(char::from(key.0));
                value.render_to(out);
                out.push('}');
            }
        }
    }
}

/// Renders the canonical form, so that for any valid signature
/// `parse_one(s)` followed by `to_string()` reproduces `s`.
impl fmt::Display for TypeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.render_to(&mut out);
        f.write_str(&out)
    }
}
