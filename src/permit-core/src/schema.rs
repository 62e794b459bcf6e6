//! Permit schema loading and validation.
//!
//! Compiles an XSD into a small in-memory model and validates permit XML
//! against it. The supported subset is what the permit schema uses:
//!
//! - global `xs:element` declarations
//! - named `xs:complexType` with one `xs:sequence` of elements
//!   (`minOccurs`, `maxOccurs` including `unbounded`) and `xs:attribute`
//!   declarations (`use="required"`)
//! - named `xs:simpleType` restricting `xs:string`, `xs:date` or an integer
//!   type with `length`, `minLength`, `maxLength`, `enumeration` and
//!   `minInclusive` facets
//! - `elementFormDefault="qualified"`
//!
//! Anything else in the XSD is rejected at load time rather than silently
//! ignored. The target namespace and version are read from the XSD root.
//!
//! Validation collects every violation, each prefixed with the element path.

use std::collections::HashMap;
use std::path::Path;

use chrono::NaiveDate;
use roxmltree::{Document, Node};
use tracing::debug;

use crate::error::PermitError;

/// XML Schema namespace.
pub const XS_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";

/// Schema bundled with the crate.
pub const BUNDLED_SCHEMA: &str = include_str!("../schema/Permit_Schema.xsd");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Builtin {
    String,
    Date,
    Integer,
    PositiveInteger,
    NonNegativeInteger,
}

impl Builtin {
    fn from_local(name: &str) -> Option<Self> {
        Some(match name {
            "string" | "normalizedString" | "token" => Self::String,
            "date" => Self::Date,
            "integer" | "int" | "long" => Self::Integer,
            "positiveInteger" => Self::PositiveInteger,
            "nonNegativeInteger" => Self::NonNegativeInteger,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TypeRef {
    Builtin(Builtin),
    Named(String),
}

#[derive(Debug, Clone)]
struct ElementDecl {
    name: String,
    type_ref: TypeRef,
    min_occurs: u32,
    /// `None` is unbounded.
    max_occurs: Option<u32>,
}

#[derive(Debug, Clone)]
struct AttributeDecl {
    name: String,
    type_ref: TypeRef,
    required: bool,
}

#[derive(Debug, Clone, Default)]
struct ComplexType {
    sequence: Vec<ElementDecl>,
    attributes: Vec<AttributeDecl>,
}

#[derive(Debug, Clone, Default)]
struct Facets {
    length: Option<usize>,
    min_length: Option<usize>,
    max_length: Option<usize>,
    enumeration: Vec<String>,
    min_inclusive: Option<i64>,
}

#[derive(Debug, Clone)]
struct SimpleType {
    base: Builtin,
    facets: Facets,
}

/// A compiled permit schema.
#[derive(Debug, Clone)]
pub struct PermitSchema {
    target_namespace: String,
    version: String,
    elements: Vec<ElementDecl>,
    complex_types: HashMap<String, ComplexType>,
    simple_types: HashMap<String, SimpleType>,
}

impl PermitSchema {
    /// Compile the bundled schema.
    ///
    /// # Errors
    ///
    /// Returns [`PermitError::SchemaLoad`] if the bundled schema is invalid.
    pub fn bundled() -> Result<Self, PermitError> {
        Self::parse(BUNDLED_SCHEMA)
    }

    /// Load and compile a schema file.
    ///
    /// # Errors
    ///
    /// Returns [`PermitError::SchemaLoad`] if the file cannot be read or
    /// uses unsupported constructs.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PermitError> {
        let path = path.as_ref();
        let xsd = std::fs::read_to_string(path)
            .map_err(|e| load_error(format!("failed to read {}: {}", path.display(), e)))?;
        Self::parse(&xsd)
    }

    /// Compile a schema from XSD text.
    ///
    /// # Errors
    ///
    /// Returns [`PermitError::SchemaLoad`] on malformed XML or unsupported
    /// constructs.
    pub fn parse(xsd: &str) -> Result<Self, PermitError> {
        let doc = Document::parse(xsd).map_err(|e| load_error(format!("malformed XSD: {e}")))?;
        let root = doc.root_element();
        if !is_xs(root, "schema") {
            return Err(load_error("root element is not xs:schema"));
        }

        let target_namespace = root
            .attribute("targetNamespace")
            .ok_or_else(|| load_error("schema has no targetNamespace"))?
            .to_string();
        let version = root
            .attribute("version")
            .ok_or_else(|| load_error("schema has no version"))?
            .to_string();
        if root.attribute("elementFormDefault") != Some("qualified") {
            return Err(load_error("only elementFormDefault=\"qualified\" is supported"));
        }

        let mut schema = Self {
            target_namespace,
            version,
            elements: Vec::new(),
            complex_types: HashMap::new(),
            simple_types: HashMap::new(),
        };

        for child in root.children().filter(Node::is_element) {
            match xs_local(child) {
                Some("element") => {
                    let decl = schema.element_decl(child)?;
                    schema.elements.push(decl);
                },
                Some("complexType") => {
                    let name = required_attr(child, "name")?;
                    let ct = schema.complex_type(child)?;
                    schema.complex_types.insert(name.to_string(), ct);
                },
                Some("simpleType") => {
                    let name = required_attr(child, "name")?;
                    let st = simple_type(child)?;
                    schema.simple_types.insert(name.to_string(), st);
                },
                Some("annotation") => {},
                _ => return Err(load_error(format!("unsupported top-level <{}>", child.tag_name().name()))),
            }
        }

        schema.check_references()?;
        debug!(
            namespace = %schema.target_namespace,
            version = %schema.version,
            complex_types = schema.complex_types.len(),
            simple_types = schema.simple_types.len(),
            "Permit schema compiled"
        );
        Ok(schema)
    }

    /// Target namespace declared by the schema.
    #[must_use]
    pub fn target_namespace(&self) -> &str {
        &self.target_namespace
    }

    /// Version declared by the schema.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Validate an XML document.
    ///
    /// # Errors
    ///
    /// Returns [`PermitError::InvalidSchema`] listing every violation.
    pub fn validate(&self, xml: &str) -> Result<(), PermitError> {
        let violations = self.violations(xml);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(PermitError::InvalidSchema { violations })
        }
    }

    /// Whether an XML document is valid.
    #[must_use]
    pub fn is_valid(&self, xml: &str) -> bool {
        self.violations(xml).is_empty()
    }

    /// Every violation in an XML document.
    #[must_use]
    pub fn violations(&self, xml: &str) -> Vec<String> {
        let doc = match Document::parse(xml) {
            Ok(doc) => doc,
            Err(e) => return vec![format!("document is not well-formed: {e}")],
        };

        let root = doc.root_element();
        let name = root.tag_name().name();
        let path = format!("/{name}");
        let mut violations = Vec::new();

        if root.tag_name().namespace() != Some(self.target_namespace.as_str()) {
            violations.push(format!(
                "{path}: root element is not in namespace {}",
                self.target_namespace
            ));
            return violations;
        }

        match self.elements.iter().find(|e| e.name == name) {
            Some(decl) => self.validate_element(root, decl, &path, &mut violations),
            None => violations.push(format!("{path}: no global element declaration")),
        }
        violations
    }

    fn validate_element(&self, node: Node, decl: &ElementDecl, path: &str, out: &mut Vec<String>) {
        match &decl.type_ref {
            TypeRef::Builtin(builtin) => {
                self.validate_simple_content(node, *builtin, &Facets::default(), path, out);
            },
            TypeRef::Named(name) => {
                if let Some(ct) = self.complex_types.get(name) {
                    self.validate_complex(node, ct, path, out);
                } else if let Some(st) = self.simple_types.get(name) {
                    self.validate_simple_content(node, st.base, &st.facets, path, out);
                }
            },
        }
    }

    fn validate_simple_content(
        &self,
        node: Node,
        base: Builtin,
        facets: &Facets,
        path: &str,
        out: &mut Vec<String>,
    ) {
        if node.children().any(|c| c.is_element()) {
            out.push(format!("{path}: element must not contain child elements"));
            return;
        }
        if let Some(attr) = node.attributes().next() {
            out.push(format!("{path}: unexpected attribute {}", attr.name()));
        }
        let text: String = node.children().filter_map(|c| c.text()).collect();
        if let Err(message) = check_value(&text, base, facets) {
            out.push(format!("{path}: {message}"));
        }
    }

    fn validate_complex(&self, node: Node, ct: &ComplexType, path: &str, out: &mut Vec<String>) {
        for attr in &ct.attributes {
            match node.attribute(attr.name.as_str()) {
                None if attr.required => {
                    out.push(format!("{path}: missing required attribute {}", attr.name));
                },
                None => {},
                Some(value) => {
                    if let Err(message) = self.check_type_ref(value, &attr.type_ref) {
                        out.push(format!("{path}/@{}: {message}", attr.name));
                    }
                },
            }
        }
        for attr in node.attributes() {
            let declared = attr.namespace().is_none()
                && ct.attributes.iter().any(|a| a.name == attr.name());
            if !declared {
                out.push(format!("{path}: unexpected attribute {}", attr.name()));
            }
        }

        if node
            .children()
            .any(|c| c.is_text() && c.text().is_some_and(|t| !t.trim().is_empty()))
        {
            out.push(format!("{path}: unexpected text content"));
        }

        let children: Vec<Node> = node.children().filter(Node::is_element).collect();
        let mut i = 0;
        for particle in &ct.sequence {
            let mut count: u32 = 0;
            while i < children.len()
                && self.matches(children[i], particle)
                && particle.max_occurs.map_or(true, |max| count < max)
            {
                count += 1;
                let child_path = format!("{path}/{}[{count}]", particle.name);
                self.validate_element(children[i], particle, &child_path, out);
                i += 1;
            }
            if count < particle.min_occurs {
                out.push(format!(
                    "{path}: expected element {} at least {} time(s), found {}",
                    particle.name, particle.min_occurs, count
                ));
            }
        }
        for extra in &children[i..] {
            out.push(format!("{path}: unexpected element {}", extra.tag_name().name()));
        }
    }

    fn matches(&self, node: Node, particle: &ElementDecl) -> bool {
        node.tag_name().name() == particle.name
            && node.tag_name().namespace() == Some(self.target_namespace.as_str())
    }

    fn check_type_ref(&self, value: &str, type_ref: &TypeRef) -> Result<(), String> {
        match type_ref {
            TypeRef::Builtin(builtin) => check_value(value, *builtin, &Facets::default()),
            TypeRef::Named(name) => match self.simple_types.get(name) {
                Some(st) => check_value(value, st.base, &st.facets),
                None => Err(format!("type {name} is not a simple type")),
            },
        }
    }

    fn element_decl(&self, node: Node) -> Result<ElementDecl, PermitError> {
        let name = required_attr(node, "name")?.to_string();
        let type_ref = self.type_ref(node, required_attr(node, "type")?)?;

        let min_occurs = match node.attribute("minOccurs") {
            None => 1,
            Some(v) => v
                .parse()
                .map_err(|_| load_error(format!("element {name}: bad minOccurs {v}")))?,
        };
        let max_occurs = match node.attribute("maxOccurs") {
            None => Some(1),
            Some("unbounded") => None,
            Some(v) => Some(
                v.parse()
                    .map_err(|_| load_error(format!("element {name}: bad maxOccurs {v}")))?,
            ),
        };

        Ok(ElementDecl {
            name,
            type_ref,
            min_occurs,
            max_occurs,
        })
    }

    fn complex_type(&self, node: Node) -> Result<ComplexType, PermitError> {
        let mut ct = ComplexType::default();
        for child in node.children().filter(Node::is_element) {
            match xs_local(child) {
                Some("sequence") => {
                    for item in child.children().filter(Node::is_element) {
                        if xs_local(item) != Some("element") {
                            return Err(load_error(format!(
                                "unsupported <{}> in sequence",
                                item.tag_name().name()
                            )));
                        }
                        ct.sequence.push(self.element_decl(item)?);
                    }
                },
                Some("attribute") => {
                    let name = required_attr(child, "name")?.to_string();
                    let type_ref = self.type_ref(child, required_attr(child, "type")?)?;
                    ct.attributes.push(AttributeDecl {
                        name,
                        type_ref,
                        required: child.attribute("use") == Some("required"),
                    });
                },
                Some("annotation") => {},
                _ => {
                    return Err(load_error(format!(
                        "unsupported <{}> in complexType",
                        child.tag_name().name()
                    )))
                },
            }
        }
        Ok(ct)
    }

    fn type_ref(&self, node: Node, qname: &str) -> Result<TypeRef, PermitError> {
        let (prefix, local) = match qname.split_once(':') {
            Some((prefix, local)) => (Some(prefix), local),
            None => (None, qname),
        };
        let namespace = node.lookup_namespace_uri(prefix);

        if namespace == Some(XS_NAMESPACE) {
            return Builtin::from_local(local)
                .map(TypeRef::Builtin)
                .ok_or_else(|| load_error(format!("unsupported built-in type xs:{local}")));
        }
        if namespace == Some(self.target_namespace.as_str()) {
            return Ok(TypeRef::Named(local.to_string()));
        }
        Err(load_error(format!("type {qname} is not in the target namespace")))
    }

    fn check_references(&self) -> Result<(), PermitError> {
        let element_types = self
            .elements
            .iter()
            .chain(self.complex_types.values().flat_map(|ct| ct.sequence.iter()))
            .map(|e| &e.type_ref);
        for type_ref in element_types {
            if let TypeRef::Named(name) = type_ref {
                if !self.complex_types.contains_key(name) && !self.simple_types.contains_key(name) {
                    return Err(load_error(format!("undefined type {name}")));
                }
            }
        }
        for attr in self.complex_types.values().flat_map(|ct| ct.attributes.iter()) {
            if let TypeRef::Named(name) = &attr.type_ref {
                if !self.simple_types.contains_key(name) {
                    return Err(load_error(format!("undefined simple type {name}")));
                }
            }
        }
        Ok(())
    }
}

fn simple_type(node: Node) -> Result<SimpleType, PermitError> {
    let restriction = node
        .children()
        .find(|c| xs_local(*c) == Some("restriction"))
        .ok_or_else(|| load_error("simpleType without restriction"))?;

    let base_qname = required_attr(restriction, "base")?;
    let (prefix, local) = base_qname.split_once(':').unwrap_or(("", base_qname));
    let prefix = (!prefix.is_empty()).then_some(prefix);
    if restriction.lookup_namespace_uri(prefix) != Some(XS_NAMESPACE) {
        return Err(load_error(format!("restriction base {base_qname} must be a built-in type")));
    }
    let base = Builtin::from_local(local)
        .ok_or_else(|| load_error(format!("unsupported built-in type xs:{local}")))?;

    let mut facets = Facets::default();
    for facet in restriction.children().filter(Node::is_element) {
        let value = required_attr(facet, "value")?;
        let as_usize = || {
            value
                .parse::<usize>()
                .map_err(|_| load_error(format!("bad facet value {value}")))
        };
        match xs_local(facet) {
            Some("length") => facets.length = Some(as_usize()?),
            Some("minLength") => facets.min_length = Some(as_usize()?),
            Some("maxLength") => facets.max_length = Some(as_usize()?),
            Some("enumeration") => facets.enumeration.push(value.to_string()),
            Some("minInclusive") => {
                facets.min_inclusive = Some(
                    value
                        .parse()
                        .map_err(|_| load_error(format!("bad minInclusive {value}")))?,
                );
            },
            _ => {
                return Err(load_error(format!(
                    "unsupported facet <{}>",
                    facet.tag_name().name()
                )))
            },
        }
    }

    Ok(SimpleType { base, facets })
}

fn check_value(raw: &str, base: Builtin, facets: &Facets) -> Result<(), String> {
    let value = match base {
        Builtin::String => raw,
        _ => raw.trim(),
    };

    let number = match base {
        Builtin::String => None,
        Builtin::Date => {
            if !is_xs_date(value) {
                return Err(format!("'{value}' is not a valid xs:date"));
            }
            None
        },
        Builtin::Integer | Builtin::PositiveInteger | Builtin::NonNegativeInteger => {
            let n: i64 = value
                .parse()
                .map_err(|_| format!("'{value}' is not a valid integer"))?;
            if base == Builtin::PositiveInteger && n < 1 {
                return Err(format!("{n} is not a positive integer"));
            }
            if base == Builtin::NonNegativeInteger && n < 0 {
                return Err(format!("{n} is negative"));
            }
            Some(n)
        },
    };

    let len = value.chars().count();
    if let Some(expected) = facets.length {
        if len != expected {
            return Err(format!("length {len} does not equal {expected}"));
        }
    }
    if let Some(min) = facets.min_length {
        if len < min {
            return Err(format!("length {len} is below minimum {min}"));
        }
    }
    if let Some(max) = facets.max_length {
        if len > max {
            return Err(format!("length {len} exceeds maximum {max}"));
        }
    }
    if !facets.enumeration.is_empty() && !facets.enumeration.iter().any(|e| e == value) {
        return Err(format!("'{value}' is not one of the allowed values"));
    }
    if let Some(min) = facets.min_inclusive {
        match number {
            Some(n) if n >= min => {},
            Some(n) => return Err(format!("{n} is below minimum {min}")),
            None => return Err("minInclusive applies to numeric values only".to_string()),
        }
    }
    Ok(())
}

/// `YYYY-MM-DD` optionally followed by `Z` or `+hh:mm` / `-hh:mm`.
fn is_xs_date(value: &str) -> bool {
    let (Some(date), Some(zone)) = (value.get(..10), value.get(10..)) else {
        return false;
    };
    if NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
        return false;
    }
    match zone.as_bytes() {
        [] | [b'Z'] => true,
        [sign, h1, h2, b':', m1, m2] if matches!(*sign, b'+' | b'-') => {
            let digits = [h1, h2, m1, m2];
            if !digits.iter().all(|d| d.is_ascii_digit()) {
                return false;
            }
            let hours = (h1 - b'0') * 10 + (h2 - b'0');
            let minutes = (m1 - b'0') * 10 + (m2 - b'0');
            (hours < 14 && minutes < 60) || (hours == 14 && minutes == 0)
        },
        _ => false,
    }
}

fn is_xs(node: Node, local: &str) -> bool {
    xs_local(node) == Some(local)
}

fn xs_local<'a>(node: Node<'a, '_>) -> Option<&'a str> {
    (node.is_element() && node.tag_name().namespace() == Some(XS_NAMESPACE))
        .then(|| node.tag_name().name())
}

fn required_attr<'a>(node: Node<'a, '_>, name: &str) -> Result<&'a str, PermitError> {
    node.attribute(name).ok_or_else(|| {
        load_error(format!(
            "<{}> is missing the {name} attribute",
            node.tag_name().name()
        ))
    })
}

fn load_error(message: impl Into<String>) -> PermitError {
    PermitError::SchemaLoad {
        message: message.into(),
    }
}
