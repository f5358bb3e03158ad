use super::CatalogError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

/// A product price as the console holds it.
///
/// Form inputs produce text, the store holds numbers. Both forms can end up in
/// the local list, so the price keeps whichever it was given and converts on
/// demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Price {
    Number(f64),
    Text(String),
}

impl Default for Price {
    fn default() -> Self {
        Price::Text(String::new())
    }
}

impl From<f64> for Price {
    fn from(value: f64) -> Self {
        Price::Number(value)
    }
}

impl From<&str> for Price {
    fn from(value: &str) -> Self {
        Price::Text(value.to_string())
    }
}

impl From<String> for Price {
    fn from(value: String) -> Self {
        Price::Text(value)
    }
}

impl Price {
    /// The numeric value to persist. Must be finite and non-negative.
    pub fn to_number(&self) -> Result<f64, CatalogError> {
        let number = match self {
            Price::Number(n) => *n,
            Price::Text(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return Err(CatalogError::InvalidPrice("price is required".into()));
                }
                text.parse::<f64>()
                    .map_err(|_| CatalogError::InvalidPrice(format!("'{}' is not a number", text)))?
            }
        };
        if !number.is_finite() || number < 0.0 {
            return Err(CatalogError::InvalidPrice(format!(
                "{} is not a valid price",
                number
            )));
        }
        Ok(number)
    }

    /// The number a table shows for this price. Unlike [`Price::to_number`]
    /// nothing is rejected: blank text counts as zero and text that is not a
    /// number becomes NaN.
    pub fn display_value(&self) -> f64 {
        match self {
            Price::Number(n) => *n,
            Price::Text(text) => {
                let text = text.trim();
                if text.is_empty() {
                    0.0
                } else {
                    text.parse().unwrap_or(f64::NAN)
                }
            }
        }
    }

    /// Two-decimal rendering for tables, e.g. `3.50`.
    ///
    /// Halfway values round away from zero, so `0.125` shows as `0.13`.
    /// Unparsable text renders as `NaN`.
    pub fn display(&self) -> String {
        to_fixed_2(self.display_value())
    }
}

fn to_fixed_2(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }

    // Every finite f64 has at most 1074 fractional digits, so this is the
    // exact decimal value and the rounding decision sees no binary error.
    let exact = format!("{:.1074}", n.abs());
    let Some((int_part, frac_part)) = exact.split_once('.') else {
        return format!("{}.00", exact);
    };
    let frac = frac_part.as_bytes();

    let mut digits: Vec<u8> = int_part.bytes().chain(frac[..2].iter().copied()).collect();
    if frac[2] >= b'5' {
        let mut i = digits.len();
        loop {
            if i == 0 {
                digits.insert(0, b'1');
                break;
            }
            i -= 1;
            if digits[i] == b'9' {
                digits[i] = b'0';
            } else {
                digits[i] += 1;
                break;
            }
        }
    }

    let split = digits.len() - 2;
    let sign = if n < 0.0 { "-" } else { "" };
    format!(
        "{}{}.{}",
        sign,
        String::from_utf8_lossy(&digits[..split]),
        String::from_utf8_lossy(&digits[split..])
    )
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

/// The add-product form: a product without an id yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDraft {
    pub name: String,
    pub price: Price,
    pub category: String,
    pub image: String,
    pub availability: bool,
}

impl Default for ProductDraft {
    fn default() -> Self {
        Self {
            name: String::new(),
            price: Price::default(),
            category: String::new(),
            image: String::new(),
            availability: true,
        }
    }
}

impl ProductDraft {
    /// Checks required fields and returns the numeric price to persist.
    pub fn validate(&self) -> Result<f64, CatalogError> {
        validate_fields(&self.name, &self.category)?;
        self.price.to_number()
    }

    /// The full node written to the store for a new product.
    pub(crate) fn to_stored(&self, price: f64) -> Value {
        json!({
            "name": self.name,
            "price": price,
            "category": self.category,
            "image": self.image,
            "availability": self.availability,
        })
    }
}

fn validate_fields(name: &str, category: &str) -> Result<(), CatalogError> {
    if name.trim().is_empty() {
        return Err(CatalogError::Validation("name is required".into()));
    }
    if category.trim().is_empty() {
        return Err(CatalogError::Validation("category is required".into()));
    }
    Ok(())
}

/// One product in the local list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: String,
    pub name: String,
    pub price: Price,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub image: String,
    // Records written without the flag count as out of stock.
    #[serde(default)]
    pub availability: bool,
}

/// The stored shape of a product: everything but the id, which is its key.
#[derive(Deserialize)]
struct StoredProduct {
    name: String,
    price: Price,
    #[serde(default)]
    category: String,
    #[serde(default)]
    image: String,
    #[serde(default)]
    availability: bool,
}

impl ProductRecord {
    pub fn from_draft(id: String, draft: ProductDraft) -> Self {
        Self {
            id,
            name: draft.name,
            price: draft.price,
            category: draft.category,
            image: draft.image,
            availability: draft.availability,
        }
    }

    /// Decodes a stored node keyed by `id`.
    pub fn from_stored(id: String, value: Value) -> Result<Self, serde_json::Error> {
        let stored: StoredProduct = serde_json::from_value(value)?;
        Ok(Self {
            id,
            name: stored.name,
            price: stored.price,
            category: stored.category,
            image: stored.image,
            availability: stored.availability,
        })
    }

    pub fn validate(&self) -> Result<f64, CatalogError> {
        validate_fields(&self.name, &self.category)?;
        self.price.to_number()
    }

    /// The fields an edit writes. Availability is left to the toggle.
    pub(crate) fn edit_fields(&self, price: f64) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("name".into(), json!(self.name));
        fields.insert("price".into(), json!(price));
        fields.insert("category".into(), json!(self.category));
        fields.insert("image".into(), json!(self.image));
        fields
    }
}

/// Counts shown above the product table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogStats {
    pub total: usize,
    pub in_stock: usize,
    pub out_of_stock: usize,
}

impl CatalogStats {
    pub fn from_products(products: &[ProductRecord]) -> Self {
        let total = products.len();
        let in_stock = products.iter().filter(|p| p.availability).count();
        Self {
            total,
            in_stock,
            out_of_stock: total - in_stock,
        }
    }
}
