//! XML serialization of permits and signature documents.
//!
//! Model types carry no serialization attributes. Each type has a mapping
//! table from XML element or attribute name to a field accessor, and the
//! serializer walks those tables. Output is indented UTF-8 without BOM;
//! the writer itself emits no declaration, [`XML_DECLARATION`] is prepended
//! to the finished document.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::error::PermitError;
use crate::permit::{DatasetPermit, Permit, PermitHeader, Product, EXPIRY_FORMAT};
use crate::signature::SignatureDocument;

/// Declaration prepended to every document.
pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;
/// Prefix bound to the permit namespace.
pub const PERMIT_PREFIX: &str = "S100SE";
/// Prefix bound to the geographic-common namespace.
pub const GCO_PREFIX: &str = "gco";
/// ISO 19115-3 geographic-common namespace.
pub const GCO_NAMESPACE: &str = "http://standards.iso.org/iso/19115/-3/gco/1.0";

/// Escape sequence some serializers emit for a colon in a name.
const ESCAPED_COLON: &str = "_x003A_";

/// One element or attribute mapped to a field accessor.
struct Field<T> {
    name: &'static str,
    value: fn(&T) -> String,
}

const HEADER_ELEMENTS: &[Field<PermitHeader>] = &[
    Field { name: "issueDate", value: |h| h.issue_date.clone() },
    Field { name: "dataServerName", value: |h| h.data_server_name.clone() },
    Field { name: "dataServerIdentifier", value: |h| h.data_server_identifier.clone() },
    Field { name: "version", value: |h| h.version.clone() },
    Field { name: "userpermit", value: |h| h.user_permit.clone() },
];

const PRODUCT_ATTRIBUTES: &[Field<Product>] = &[Field { name: "id", value: |p| p.id.clone() }];

const DATASET_PERMIT_ELEMENTS: &[Field<DatasetPermit>] = &[
    Field { name: "filename", value: |d| d.filename.clone() },
    Field { name: "editionNumber", value: |d| d.edition_number.clone() },
    Field { name: "expiry", value: |d| d.expiry.format(EXPIRY_FORMAT).to_string() },
    Field { name: "encryptedKey", value: |d| d.encrypted_key.clone() },
];

/// Serializer bound to one permit namespace.
#[derive(Debug, Clone)]
pub struct XmlSerializer {
    namespace: String,
}

impl XmlSerializer {
    /// Create a serializer for `namespace`.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// Namespace bound to [`PERMIT_PREFIX`].
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Serialize a permit to a complete XML document.
    ///
    /// # Errors
    ///
    /// Returns [`PermitError::Serialization`] if writing fails.
    pub fn serialize_permit(&self, permit: &Permit) -> Result<String, PermitError> {
        let mut w = Writer::new_with_indent(Vec::new(), b' ', 2);

        self.open_root(&mut w, "Permit")?;

        open(&mut w, "header", &[])?;
        write_elements(&mut w, HEADER_ELEMENTS, &permit.header)?;
        close(&mut w, "header")?;

        open(&mut w, "products", &[])?;
        for product in &permit.products {
            let attrs: Vec<(&str, String)> = PRODUCT_ATTRIBUTES
                .iter()
                .map(|f| (f.name, (f.value)(product)))
                .collect();
            open(&mut w, "product", &attrs)?;
            for dataset in &product.dataset_permits {
                open(&mut w, "datasetPermit", &[])?;
                write_elements(&mut w, DATASET_PERMIT_ELEMENTS, dataset)?;
                close(&mut w, "datasetPermit")?;
            }
            close(&mut w, "product")?;
        }
        close(&mut w, "products")?;

        close(&mut w, "Permit")?;
        finish(w)
    }

    /// Serialize a standalone signature document.
    ///
    /// # Errors
    ///
    /// Returns [`PermitError::Serialization`] if writing fails.
    pub fn serialize_signature(&self, doc: &SignatureDocument) -> Result<String, PermitError> {
        let mut w = Writer::new_with_indent(Vec::new(), b' ', 2);

        self.open_root(&mut w, "StandaloneDigitalSignature")?;
        text_element(&mut w, "filename", &doc.filename)?;
        open(&mut w, "certificate", &[("id", doc.certificate_id.clone())])?;
        text(&mut w, &doc.certificate_base64())?;
        close(&mut w, "certificate")?;
        open(
            &mut w,
            "digitalSignature",
            &[
                ("id", doc.signature_id.clone()),
                ("certificateRef", doc.certificate_id.clone()),
            ],
        )?;
        text(&mut w, &doc.signature)?;
        close(&mut w, "digitalSignature")?;
        close(&mut w, "StandaloneDigitalSignature")?;
        finish(w)
    }

    fn open_root(&self, w: &mut Writer<Vec<u8>>, local: &str) -> Result<(), PermitError> {
        let mut start = BytesStart::new(qualified(local));
        start.push_attribute((format!("xmlns:{PERMIT_PREFIX}").as_str(), self.namespace.as_str()));
        start.push_attribute((format!("xmlns:{GCO_PREFIX}").as_str(), GCO_NAMESPACE));
        w.write_event(Event::Start(start)).map_err(write_error)
    }
}

/// Rewrite escaped colons back to literal colons.
#[must_use]
pub fn restore_colons(xml: &str) -> String {
    xml.replace(ESCAPED_COLON, ":")
}

fn qualified(local: &str) -> String {
    format!("{PERMIT_PREFIX}:{local}")
}

fn open(w: &mut Writer<Vec<u8>>, local: &str, attrs: &[(&str, String)]) -> Result<(), PermitError> {
    let mut start = BytesStart::new(qualified(local));
    for (name, value) in attrs {
        start.push_attribute((*name, value.as_str()));
    }
    w.write_event(Event::Start(start)).map_err(write_error)
}

fn close(w: &mut Writer<Vec<u8>>, local: &str) -> Result<(), PermitError> {
    w.write_event(Event::End(BytesEnd::new(qualified(local))))
        .map_err(write_error)
}

fn text(w: &mut Writer<Vec<u8>>, value: &str) -> Result<(), PermitError> {
    w.write_event(Event::Text(BytesText::new(value)))
        .map_err(write_error)
}

fn text_element(w: &mut Writer<Vec<u8>>, local: &str, value: &str) -> Result<(), PermitError> {
    open(w, local, &[])?;
    text(w, value)?;
    close(w, local)
}

fn write_elements<T>(w: &mut Writer<Vec<u8>>, fields: &[Field<T>], item: &T) -> Result<(), PermitError> {
    for field in fields {
        text_element(w, field.name, &(field.value)(item))?;
    }
    Ok(())
}

fn finish(w: Writer<Vec<u8>>) -> Result<String, PermitError> {
    let body = String::from_utf8(w.into_inner())
        .map_err(|e| PermitError::serialization(format!("non UTF-8 output: {e}")))?;
    Ok(format!("{XML_DECLARATION}\n{}", restore_colons(&body)))
}

fn write_error(e: impl std::fmt::Display) -> PermitError {
    PermitError::serialization(e.to_string())
}
