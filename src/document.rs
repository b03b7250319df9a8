//! # DID Document
//!
//! A DID Document is a JSON-LD document that contains information related to a
//! DID. Documents built here use `Multikey` verification methods and reference
//! them by id from the verification relationships.
//!
//! Properties this crate does not model are kept in `additional` so a
//! document read from a log re-serializes (and so re-hashes) unchanged.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::BASE_CONTEXT;
use crate::core::{Kind, OneMany};

/// DID Document
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// The context of the DID document.
    #[serde(rename = "@context", default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<Kind<Value>>,

    /// The DID for a particular DID subject.
    pub id: String,

    /// A set of URIs that are other identifiers for the subject of the above
    /// DID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub also_known_as: Option<Vec<String>>,

    /// DIDs authorized to make changes to this document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller: Option<OneMany<String>>,

    /// A set of verification methods for the DID subject.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_method: Option<Vec<VerificationMethod>>,

    /// How the DID subject is expected to be authenticated.
    ///
    /// <https://www.w3.org/TR/did-core/#authentication>
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication: Option<Vec<Kind<VerificationMethod>>>,

    /// How the DID subject is expected to express claims, such as for the
    /// purposes of issuing a Verifiable Credential.
    ///
    /// <https://www.w3.org/TR/did-core/#assertion>
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assertion_method: Option<Vec<Kind<VerificationMethod>>>,

    /// How an entity can generate encryption material to transmit
    /// confidential information intended for the DID subject.
    ///
    /// <https://www.w3.org/TR/did-core/#key-agreement>
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_agreement: Option<Vec<Kind<VerificationMethod>>>,

    /// Verification methods the DID subject may use to invoke a
    /// cryptographic capability.
    ///
    /// <https://www.w3.org/TR/did-core/#capability-invocation>
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capability_invocation: Option<Vec<Kind<VerificationMethod>>>,

    /// Verification methods the DID subject may use to delegate a
    /// cryptographic capability to another party.
    ///
    /// <https://www.w3.org/TR/did-core/#capability-delegation>
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capability_delegation: Option<Vec<Kind<VerificationMethod>>>,

    /// A set of services that express ways of communicating with the DID
    /// subject or related entities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<Vec<Service>>,

    /// Any other document properties.
    #[serde(flatten)]
    pub additional: BTreeMap<String, Value>,
}

impl Document {
    /// Retrieve a verification method by its id, whether declared in
    /// `verificationMethod` or embedded in a verification relationship.
    /// Relative ids (`#fragment`) are matched against the document's DID.
    #[must_use]
    pub fn verification_method(&self, id: &str) -> Option<&VerificationMethod> {
        let embedded = [
            &self.authentication,
            &self.assertion_method,
            &self.key_agreement,
            &self.capability_invocation,
            &self.capability_delegation,
        ]
        .into_iter()
        .flatten()
        .flatten()
        .filter_map(|kind| match kind {
            Kind::Object(vm) => Some(vm),
            Kind::String(_) => None,
        });
        let mut methods = self.verification_method.iter().flatten().chain(embedded);
        methods.find(|vm| self.same_id(&vm.id, id))
    }

    /// Retrieve a service by its id.
    #[must_use]
    pub fn service(&self, id: &str) -> Option<&Service> {
        self.service.as_ref()?.iter().find(|s| self.same_id(&s.id, id))
    }

    /// Remove every verification method and empty every verification
    /// relationship.
    pub fn clear_keys(&mut self) {
        self.verification_method = Some(vec![]);
        for relationship in [
            &mut self.authentication,
            &mut self.assertion_method,
            &mut self.key_agreement,
            &mut self.capability_invocation,
            &mut self.capability_delegation,
        ] {
            if relationship.is_some() {
                *relationship = Some(vec![]);
            }
        }
    }

    fn same_id(&self, a: &str, b: &str) -> bool {
        let absolute = |id: &str| {
            if id.starts_with('#') { format!("{}{id}", self.id) } else { id.to_string() }
        };
        absolute(a) == absolute(b)
    }
}

/// A `Multikey` verification method.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMethod {
    /// The verification method id, a DID URL.
    pub id: String,

    /// Verification method type, usually `Multikey`.
    #[serde(rename = "type")]
    pub type_: String,

    /// The DID of the controller of the key.
    pub controller: String,

    /// The multibase-encoded public key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key_multibase: Option<String>,

    /// Any other verification method properties.
    #[serde(flatten)]
    pub additional: BTreeMap<String, Value>,
}

/// A service endpoint.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    /// Service id, a DID URL or a fragment relative to the document's DID.
    pub id: String,

    /// Service type.
    #[serde(rename = "type")]
    pub type_: String,

    /// One or more URLs, or a map, describing the endpoint.
    pub service_endpoint: Kind<Value>,
}

impl Service {
    /// Create a service with a single URL endpoint.
    pub fn new(
        id: impl Into<String>, type_: impl Into<String>, endpoint: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            type_: type_.into(),
            service_endpoint: Kind::String(endpoint.into()),
        }
    }
}

/// Verification relationship a key is added to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyPurpose {
    /// `authentication`
    Authentication,

    /// `assertionMethod`
    AssertionMethod,

    /// `keyAgreement`
    KeyAgreement,

    /// `capabilityInvocation`
    CapabilityInvocation,

    /// `capabilityDelegation`
    CapabilityDelegation,
}

/// Builds a normalized DID document.
///
/// Keys are added as `Multikey` verification methods whose id fragment is the
/// last 8 characters of the multikey. The same key added for several purposes
/// is declared once and referenced from each relationship.
#[derive(Clone, Debug)]
pub struct DocumentBuilder {
    document: Document,
}

impl DocumentBuilder {
    /// Start a document for `did` with the base contexts.
    #[must_use]
    pub fn new(did: impl Into<String>) -> Self {
        Self {
            document: Document {
                context: BASE_CONTEXT.iter().map(|c| Kind::String((*c).to_string())).collect(),
                id: did.into(),
                ..Document::default()
            },
        }
    }

    /// Start from an existing document, keeping its properties.
    #[must_use]
    pub fn from(document: &Document) -> Self {
        let mut builder = Self {
            document: document.clone(),
        };
        for ctx in BASE_CONTEXT {
            builder = builder.context(Kind::String(ctx.to_string()));
        }
        builder
    }

    /// The DID of the document being built.
    #[must_use]
    pub fn did(&self) -> &str {
        &self.document.id
    }

    /// Add a context, unless already present.
    #[must_use]
    pub fn context(mut self, context: Kind<Value>) -> Self {
        if !self.document.context.contains(&context) {
            self.document.context.push(context);
        }
        self
    }

    /// Add a `Multikey` verification method and reference it from the
    /// relationship for `purpose`.
    #[must_use]
    pub fn add_key(mut self, multikey: impl Into<String>, purpose: KeyPurpose) -> Self {
        let multikey = multikey.into();
        let start = multikey.len().saturating_sub(8);
        let fragment = multikey.get(start..).unwrap_or(&multikey);
        let id = format!("{}#{fragment}", self.document.id);

        let methods = self.document.verification_method.get_or_insert_with(Vec::new);
        if !methods.iter().any(|vm| vm.id == id) {
            methods.push(VerificationMethod {
                id: id.clone(),
                type_: "Multikey".to_string(),
                controller: self.document.id.clone(),
                public_key_multibase: Some(multikey.clone()),
                additional: BTreeMap::new(),
            });
        }

        let relationship = match purpose {
            KeyPurpose::Authentication => &mut self.document.authentication,
            KeyPurpose::AssertionMethod => &mut self.document.assertion_method,
            KeyPurpose::KeyAgreement => &mut self.document.key_agreement,
            KeyPurpose::CapabilityInvocation => &mut self.document.capability_invocation,
            KeyPurpose::CapabilityDelegation => &mut self.document.capability_delegation,
        };
        let refs = relationship.get_or_insert_with(Vec::new);
        if !refs.iter().any(|r| r.as_str() == Some(id.as_str())) {
            refs.push(Kind::String(id));
        }
        self
    }

    /// Add a service endpoint. A fragment id (`#name`) is made absolute.
    #[must_use]
    pub fn service(mut self, mut service: Service) -> Self {
        if service.id.starts_with('#') {
            service.id = format!("{}{}", self.document.id, service.id);
        }
        let services = self.document.service.get_or_insert_with(Vec::new);
        services.retain(|s| s.id != service.id);
        services.push(service);
        self
    }

    /// Add an also-known-as identifier.
    #[must_use]
    pub fn also_known_as(mut self, aka: impl Into<String>) -> Self {
        let aka = aka.into();
        let akas = self.document.also_known_as.get_or_insert_with(Vec::new);
        if !akas.contains(&aka) {
            akas.push(aka);
        }
        self
    }

    /// Add a controller.
    #[must_use]
    pub fn controller(mut self, controller: impl Into<String>) -> Self {
        let controller = controller.into();
        self.document.controller = Some(match self.document.controller.take() {
            Some(existing) => existing.add(controller),
            None => OneMany::One(controller),
        });
        self
    }

    /// Build the document.
    ///
    /// Verification methods with the same id are collapsed to the first.
    #[must_use]
    pub fn build(mut self) -> Document {
        if let Some(methods) = &mut self.document.verification_method {
            let mut seen = Vec::new();
            methods.retain(|vm| {
                if seen.contains(&vm.id) {
                    return false;
                }
                seen.push(vm.id.clone());
                true
            });
        }
        self.document
    }
}
