// Product documents of the `productos` collection and the fixed category set.
// Stored documents are schemaless, so decoding never fails on field shape:
// a field with an unexpected JSON type reads back as absent.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value, json};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::core::draft::ValidatedProduct;

pub const COLLECTION: &str = "productos";

/// Image shown for products stored without an `imageUrl`.
pub const DEFAULT_IMAGE_URL: &str = "https://example.com/default-image.png";

#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Category {
    Vestimenta,
    Bolsos,
    Montura,
    Caballos,
    Herramientas,
    Hogar,
    Calzado,
    Personales,
}

impl Category {
    pub fn parse(value: &str) -> Option<Self> {
        value.parse().ok()
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::Vestimenta => "Accesorios de vestimenta",
            Category::Bolsos => "Bolsos/Carteras",
            Category::Montura => "Articulos de montura",
            Category::Caballos => "Herramientas/Accesorios para caballos",
            Category::Herramientas => "Accesorios para herramientas",
            Category::Hogar => "Decoracion para el hogar",
            Category::Calzado => "Calzado",
            Category::Personales => "Accesorios personales",
        }
    }
}

/// A numeric field as it was found in a document: a JSON number or text.
#[derive(Clone, Debug, PartialEq)]
pub enum Scalar {
    Number(Number),
    Text(String),
}

impl Scalar {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(number) => Some(Scalar::Number(number.clone())),
            Value::String(text) => Some(Scalar::Text(text.clone())),
            _ => None,
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Scalar::Number(number) => Value::Number(number.clone()),
            Scalar::Text(text) => Value::String(text.clone()),
        }
    }

    /// Finite numeric reading of the field; text must parse as a whole.
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            Scalar::Number(number) => number.as_f64()?,
            Scalar::Text(text) => text.trim().parse::<f64>().ok()?,
        };
        value.is_finite().then_some(value)
    }

    /// Decimal text form: `10` for 10.0, `10.5` for 10.5, text verbatim.
    pub fn display_text(&self) -> String {
        match self {
            Scalar::Number(number) => match (number.as_i64(), number.as_u64(), number.as_f64()) {
                (Some(int), _, _) => int.to_string(),
                (_, Some(uint), _) => uint.to_string(),
                (_, _, Some(float)) => float.to_string(),
                _ => number.to_string(),
            },
            Scalar::Text(text) => text.clone(),
        }
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Number::from_f64(value)
            .map(Scalar::Number)
            .unwrap_or_else(|| Scalar::Text(value.to_string()))
    }
}

impl From<u64> for Scalar {
    fn from(value: u64) -> Self {
        Scalar::Number(Number::from(value))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Product {
    pub id: String,
    pub nombre: Option<String>,
    pub descripcion: Option<String>,
    pub precio: Option<Scalar>,
    pub cantidad: Option<Scalar>,
    pub categoria: Option<String>,
    pub image_url: Option<String>,
}

impl Product {
    pub fn from_document(id: impl Into<String>, data: &Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            nombre: text_field(data, "nombre"),
            descripcion: text_field(data, "descripcion"),
            precio: data.get("precio").and_then(Scalar::from_value),
            cantidad: data.get("cantidad").and_then(Scalar::from_value),
            categoria: text_field(data, "categoria"),
            image_url: text_field(data, "imageUrl"),
        }
    }

    pub fn from_validated(id: impl Into<String>, product: &ValidatedProduct) -> Self {
        Self {
            id: id.into(),
            nombre: Some(product.nombre.clone()),
            descripcion: Some(product.descripcion.clone()),
            precio: Some(Scalar::from(product.precio)),
            cantidad: Some(Scalar::from(product.cantidad)),
            categoria: Some(product.categoria.to_string()),
            image_url: Some(product.image_url.clone()),
        }
    }

    /// Document body without the id; absent fields are omitted.
    pub fn to_document(&self) -> Map<String, Value> {
        let mut map = Map::new();
        if let Some(nombre) = &self.nombre {
            map.insert("nombre".to_string(), json!(nombre));
        }
        if let Some(descripcion) = &self.descripcion {
            map.insert("descripcion".to_string(), json!(descripcion));
        }
        if let Some(precio) = &self.precio {
            map.insert("precio".to_string(), precio.to_value());
        }
        if let Some(cantidad) = &self.cantidad {
            map.insert("cantidad".to_string(), cantidad.to_value());
        }
        if let Some(categoria) = &self.categoria {
            map.insert("categoria".to_string(), json!(categoria));
        }
        if let Some(image_url) = &self.image_url {
            map.insert("imageUrl".to_string(), json!(image_url));
        }
        map
    }

    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert("id".to_string(), json!(self.id));
        map.extend(self.to_document());
        Value::Object(map)
    }

    pub fn image_url_or_default(&self) -> &str {
        self.image_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .unwrap_or(DEFAULT_IMAGE_URL)
    }

    pub fn category(&self) -> Option<Category> {
        self.categoria.as_deref().and_then(Category::parse)
    }

    pub fn precio_text(&self) -> Option<String> {
        self.precio.as_ref().map(Scalar::display_text)
    }
}

fn text_field(data: &Map<String, Value>, key: &str) -> Option<String> {
    data.get(key).and_then(Value::as_str).map(str::to_string)
}
