//! Provider descriptors: how to recognise each payment app's notifications and where each
//! field lives in them.
//!
//! Every field is an ordered chain of extractors. The first one that yields a non-empty
//! value wins, so a provider's primary pattern is always tried before its fallback.

use crate::domain::provider::Provider;
use regex::Regex;

/// A single way of pulling one field out of flattened message text.
pub enum Extractor {
    /// Capture group 1 of the first match.
    Pattern(Regex),
    /// Custom logic for grammars a single capture cannot express.
    Function(fn(&str) -> Option<String>),
}

impl Extractor {
    fn pattern(re: &str) -> Self {
        // Patterns are literals in this module; a bad one is a programming error.
        Extractor::Pattern(Regex::new(re).expect("provider pattern is valid"))
    }

    pub fn apply(&self, text: &str) -> Option<String> {
        let raw = match self {
            Extractor::Pattern(re) => re
                .captures(text)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string()),
            Extractor::Function(f) => f(text),
        }?;
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}

/// Ordered extractors for one field.
pub struct FieldExtractors(Vec<Extractor>);

impl FieldExtractors {
    /// Creates a new chain; extractors are tried in order.
    pub fn new(chain: Vec<Extractor>) -> Self {
        Self(chain)
    }

    pub fn extract(&self, text: &str) -> Option<String> {
        self.0.iter().find_map(|extractor| extractor.apply(text))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub struct ProviderDescriptor {
    pub provider: Provider,
    /// Sender domains; subdomains match too.
    pub domains: &'static [&'static str],
    /// Lower-case strings that identify the provider inside forwarded text.
    pub signatures: &'static [&'static str],
    pub reference: FieldExtractors,
    pub amount: FieldExtractors,
    pub sender: FieldExtractors,
    pub transaction_id: FieldExtractors,
}

impl ProviderDescriptor {
    pub fn matches_domain(&self, domain: &str) -> bool {
        let domain = domain.to_ascii_lowercase();
        self.domains
            .iter()
            .any(|d| domain == *d || domain.ends_with(&format!(".{d}")))
    }

    pub fn matches_signature(&self, lowercase_text: &str) -> bool {
        self.signatures.iter().any(|s| lowercase_text.contains(s))
    }
}

/// `ORD-` followed by a UUID, anywhere in the memo.
pub const FULL_REFERENCE_PATTERN: &str =
    r"(?i)\b(ORD-[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12})\b";

/// The `Order #XXXXXXXX` form generated payment notes carry.
pub const SHORT_REFERENCE_PATTERN: &str = r"(?i)\border\s*#\s*([0-9a-f]{8})\b";

const GENERIC_AMOUNT_PATTERN: &str = r"\$\s*(\d{1,3}(?:,\d{3})+(?:\.\d{1,2})?|\d+(?:\.\d{1,2})?)";

const GENERIC_TRANSACTION_PATTERN: &str =
    r"(?i:transaction|reference|confirmation)\s*(?i:id|number|no\.?|#|code)?\s*:?\s*#?\s*([A-Z0-9]{6,})";

const PAYMENT_FROM_PATTERN: &str = r"(?i)payment from\s+([A-Za-z][\w .'-]{0,60}?)\s*(?:[.(\n]|$)";

/// Reassembles dollars and cents that the provider renders as separate tokens
/// (`$ 12 . 50`) into one decimal string.
pub fn split_dollar_amount(text: &str) -> Option<String> {
    static SPLIT: std::sync::LazyLock<Regex> = std::sync::LazyLock::new(|| {
        Regex::new(r"\$\s*(\d{1,3}(?:,\d{3})+|\d+)\s*\.\s*(\d{2})\b")
            .expect("split amount regex is valid")
    });
    SPLIT
        .captures(text)
        .map(|caps| format!("{}.{}", &caps[1], &caps[2]))
}

fn reference_chain() -> FieldExtractors {
    FieldExtractors::new(vec![
        Extractor::pattern(FULL_REFERENCE_PATTERN),
        Extractor::pattern(SHORT_REFERENCE_PATTERN),
    ])
}

fn generic_amount() -> Extractor {
    Extractor::pattern(GENERIC_AMOUNT_PATTERN)
}

fn venmo() -> ProviderDescriptor {
    ProviderDescriptor {
        provider: Provider::Venmo,
        domains: &["venmo.com"],
        signatures: &["venmo"],
        reference: reference_chain(),
        amount: FieldExtractors::new(vec![
            Extractor::Function(split_dollar_amount),
            generic_amount(),
        ]),
        sender: FieldExtractors::new(vec![
            Extractor::pattern(r"(?im)^\s*(?:fwd?:\s*)?(.+?)\s+paid you\b"),
            Extractor::pattern(PAYMENT_FROM_PATTERN),
        ]),
        transaction_id: FieldExtractors::new(vec![
            Extractor::pattern(r"(?i:payment id)\s*:?\s*(\d{6,})"),
            Extractor::pattern(GENERIC_TRANSACTION_PATTERN),
        ]),
    }
}

fn paypal() -> ProviderDescriptor {
    ProviderDescriptor {
        provider: Provider::PayPal,
        domains: &["paypal.com"],
        signatures: &["paypal"],
        reference: reference_chain(),
        amount: FieldExtractors::new(vec![
            Extractor::pattern(
                r"(?i)(?:sent you|received|payment of)\s*\$\s*(\d{1,3}(?:,\d{3})+\.\d{2}|\d+\.\d{2})",
            ),
            generic_amount(),
        ]),
        sender: FieldExtractors::new(vec![
            Extractor::pattern(r"(?im)^\s*(?:fwd?:\s*)?(.+?)\s+sent you\b"),
            Extractor::pattern(PAYMENT_FROM_PATTERN),
        ]),
        transaction_id: FieldExtractors::new(vec![
            Extractor::pattern(r"(?i:transaction id)\s*:?\s*([A-Z0-9]{17})\b"),
            Extractor::pattern(GENERIC_TRANSACTION_PATTERN),
        ]),
    }
}

fn cashapp() -> ProviderDescriptor {
    ProviderDescriptor {
        provider: Provider::CashApp,
        domains: &["cash.app", "square.com", "squareup.com"],
        signatures: &["cash app", "cash.app", "square cash"],
        reference: reference_chain(),
        amount: FieldExtractors::new(vec![
            Extractor::pattern(r"(?i)(?:sent you|received)\s*\$\s*(\d{1,3}(?:,\d{3})+(?:\.\d{2})?|\d+(?:\.\d{2})?)"),
            Extractor::Function(split_dollar_amount),
            generic_amount(),
        ]),
        sender: FieldExtractors::new(vec![
            Extractor::pattern(r"(?im)^\s*(?:fwd?:\s*)?(.+?)\s+sent you\b"),
            Extractor::pattern(PAYMENT_FROM_PATTERN),
        ]),
        transaction_id: FieldExtractors::new(vec![
            Extractor::pattern(r"(?i:identifier)\s*:?\s*#?\s*([A-Z0-9]{4,})"),
            Extractor::pattern(GENERIC_TRANSACTION_PATTERN),
        ]),
    }
}

fn zelle() -> ProviderDescriptor {
    ProviderDescriptor {
        provider: Provider::Zelle,
        domains: &["zellepay.com", "zelle.com"],
        signatures: &["zelle"],
        reference: reference_chain(),
        amount: FieldExtractors::new(vec![
            Extractor::pattern(r"(?i)(?:sent you|amount:?)\s*\$\s*(\d{1,3}(?:,\d{3})+\.\d{2}|\d+\.\d{2})"),
            generic_amount(),
        ]),
        sender: FieldExtractors::new(vec![
            Extractor::pattern(r"(?im)^\s*(?:fwd?:\s*)?(.+?)\s+sent you\b"),
            Extractor::pattern(PAYMENT_FROM_PATTERN),
        ]),
        transaction_id: FieldExtractors::new(vec![
            Extractor::pattern(r"(?i:confirmation)\s*(?i:number|code|#)?\s*:?\s*([A-Z0-9]{6,})"),
            Extractor::pattern(GENERIC_TRANSACTION_PATTERN),
        ]),
    }
}

/// Provider identifier to descriptor, iterated in registration order.
pub struct ProviderRegistry {
    descriptors: Vec<ProviderDescriptor>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new(vec![venmo(), paypal(), cashapp(), zelle()])
    }
}

impl ProviderRegistry {
    /// Creates a new registry. Lookups return the first matching descriptor.
    pub fn new(descriptors: Vec<ProviderDescriptor>) -> Self {
        Self { descriptors }
    }

    pub fn get(&self, provider: Provider) -> Option<&ProviderDescriptor> {
        self.descriptors.iter().find(|d| d.provider == provider)
    }

    pub fn by_sender_domain(&self, domain: &str) -> Option<&ProviderDescriptor> {
        self.descriptors.iter().find(|d| d.matches_domain(domain))
    }

    pub fn by_signature(&self, text: &str) -> Option<&ProviderDescriptor> {
        let lower = text.to_lowercase();
        self.descriptors.iter().find(|d| d.matches_signature(&lower))
    }
}
