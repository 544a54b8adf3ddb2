use crate::config::LinkSettings;
use crate::domain::link::{PaymentLink, QrEncoding};
use crate::domain::money::Amount;
use crate::domain::order::short_reference;
use crate::domain::provider::Provider;
use crate::error::{PaymentError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{DynamicImage, ImageFormat, Luma};
use qrcode::QrCode;
use serde::Serialize;
use std::io::Cursor;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedLinks {
    pub links: Vec<PaymentLink>,
    pub qr_encodings: Vec<QrEncoding>,
    pub short_reference: String,
    pub note: String,
}

/// Builds provider deep-links that pre-fill the amount and an order note, plus a QR
/// rendering of each. Providers without a configured handle are skipped.
#[derive(Debug, Clone)]
pub struct PaymentLinkGenerator {
    settings: LinkSettings,
}

impl PaymentLinkGenerator {
    /// Creates a new generator for the configured handles.
    pub fn new(settings: LinkSettings) -> Self {
        Self { settings }
    }

    pub fn note_for(&self, order_reference: &str) -> String {
        format!(
            "{} Order #{}",
            self.settings.product_name,
            short_reference(order_reference)
        )
    }

    /// URIs only; used where QR images are not needed.
    pub fn uris(&self, order_reference: &str, amount: Amount) -> Vec<PaymentLink> {
        let note = self.note_for(order_reference);
        let encoded = urlencoding::encode(&note);
        let amount = amount.to_fixed();
        let s = &self.settings;

        let mut links = Vec::new();
        if let Some(handle) = s.venmo_handle.as_deref() {
            links.push(PaymentLink {
                provider: Provider::Venmo,
                uri: format!(
                    "{}://paycharge?txn=pay&recipients={}&amount={}&note={}",
                    s.venmo_scheme,
                    handle.trim_start_matches('@'),
                    amount,
                    encoded
                ),
            });
        }
        if let Some(handle) = s.paypal_handle.as_deref() {
            links.push(PaymentLink {
                provider: Provider::PayPal,
                uri: format!(
                    "https://{}/{}/{}USD?notes={}",
                    s.paypal_domain, handle, amount, encoded
                ),
            });
        }
        if let Some(tag) = s.cashtag.as_deref() {
            links.push(PaymentLink {
                provider: Provider::CashApp,
                uri: format!(
                    "https://{}/${}/{}?note={}",
                    s.cash_domain,
                    tag.trim_start_matches('$'),
                    amount,
                    encoded
                ),
            });
        }
        links
    }

    pub fn generate(
        &self,
        order_reference: &str,
        amount: Amount,
        payer_name: Option<&str>,
    ) -> Result<GeneratedLinks> {
        let links = self.uris(order_reference, amount);
        let qr_encodings = links
            .iter()
            .map(|link| {
                Ok(QrEncoding {
                    provider: link.provider,
                    data_uri: qr_data_uri(&link.uri, self.settings.qr_size)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(
            reference = order_reference,
            payer = payer_name.unwrap_or("unknown"),
            count = links.len(),
            "generated payment links"
        );

        Ok(GeneratedLinks {
            links,
            qr_encodings,
            short_reference: short_reference(order_reference),
            note: self.note_for(order_reference),
        })
    }
}

/// PNG rendering of `data`, as a base64 data URI.
pub fn qr_data_uri(data: &str, min_size: u32) -> Result<String> {
    let code = QrCode::new(data.as_bytes()).map_err(|e| PaymentError::Encoding(e.to_string()))?;
    let image = code
        .render::<Luma<u8>>()
        .min_dimensions(min_size, min_size)
        .build();

    let mut png = Vec::new();
    DynamicImage::ImageLuma8(image)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| PaymentError::Encoding(e.to_string()))?;

    Ok(format!("data:image/png;base64,{}", STANDARD.encode(&png)))
}
