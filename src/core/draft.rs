// Product draft validation: the local gate applied before any create or update.
// Image presence is checked first and reported on its own, never as a field error.
// Field errors are collected for every field rather than stopping at the first.
use std::fmt;

use serde_json::{Map, Value, json};
use strum::IntoEnumIterator;

use crate::core::product::{Category, DEFAULT_IMAGE_URL, Product, Scalar};

/// Form state before submission; every field is raw user text.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProductDraft {
    pub nombre: String,
    pub descripcion: String,
    pub precio: String,
    pub cantidad: String,
    pub categoria: String,
    /// Device URI returned by the image picker, if one was chosen.
    pub image: Option<String>,
}

impl ProductDraft {
    /// Edit form seeded from a stored product.
    pub fn from_product(product: &Product) -> Self {
        Self {
            nombre: product.nombre.clone().unwrap_or_default(),
            descripcion: product.descripcion.clone().unwrap_or_default(),
            precio: product
                .precio
                .as_ref()
                .map(Scalar::display_text)
                .unwrap_or_default(),
            cantidad: product
                .cantidad
                .as_ref()
                .map(Scalar::display_text)
                .unwrap_or_default(),
            categoria: product.categoria.clone().unwrap_or_default(),
            image: product.image_url.clone(),
        }
    }

    fn selected_image(&self) -> Option<&str> {
        self.image
            .as_deref()
            .map(str::trim)
            .filter(|uri| !uri.is_empty())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Field {
    Nombre,
    Descripcion,
    Precio,
    Cantidad,
    Categoria,
}

impl Field {
    pub fn as_str(self) -> &'static str {
        match self {
            Field::Nombre => "nombre",
            Field::Descripcion => "descripcion",
            Field::Precio => "precio",
            Field::Cantidad => "cantidad",
            Field::Categoria => "categoria",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldProblem {
    Required,
    NotANumber,
    NotAnInteger,
    NotPositive,
    UnknownCategory,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldError {
    pub field: Field,
    pub problem: FieldProblem,
}

impl FieldError {
    pub fn new(field: Field, problem: FieldProblem) -> Self {
        Self { field, problem }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "field": self.field.as_str(),
            "problem": format!("{:?}", self.problem),
            "message": self.to_string(),
        })
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let field = self.field.as_str();
        match self.problem {
            FieldProblem::Required => write!(f, "{field} is required"),
            FieldProblem::NotANumber => write!(f, "{field} must be a number"),
            FieldProblem::NotAnInteger => write!(f, "{field} must be a whole number"),
            FieldProblem::NotPositive => write!(f, "{field} must be positive"),
            FieldProblem::UnknownCategory => {
                let known = Category::iter()
                    .map(|category| category.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{field} must be one of: {known}")
            }
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DraftRejection {
    ImageRequired,
    Fields(Vec<FieldError>),
}

/// A draft that passed validation, with numbers coerced for persistence.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedProduct {
    pub nombre: String,
    pub descripcion: String,
    pub precio: f64,
    pub cantidad: u64,
    pub categoria: Category,
    pub image_url: String,
}

impl ValidatedProduct {
    pub fn to_document(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("nombre".to_string(), json!(self.nombre));
        map.insert("descripcion".to_string(), json!(self.descripcion));
        map.insert("precio".to_string(), json!(self.precio));
        map.insert("cantidad".to_string(), json!(self.cantidad));
        map.insert("categoria".to_string(), json!(self.categoria.to_string()));
        map.insert("imageUrl".to_string(), json!(self.image_url));
        map
    }
}

pub fn validate_draft(
    draft: &ProductDraft,
    require_image: bool,
) -> Result<ValidatedProduct, DraftRejection> {
    let image = draft.selected_image();
    if require_image && image.is_none() {
        return Err(DraftRejection::ImageRequired);
    }

    let mut errors = Vec::new();
    let nombre = required_text(&draft.nombre, Field::Nombre, &mut errors);
    let descripcion = required_text(&draft.descripcion, Field::Descripcion, &mut errors);
    let precio = check(parse_precio(&draft.precio), &mut errors);
    let cantidad = check(parse_cantidad(&draft.cantidad), &mut errors);
    let categoria = check(parse_categoria(&draft.categoria), &mut errors);

    match (nombre, descripcion, precio, cantidad, categoria) {
        (Some(nombre), Some(descripcion), Some(precio), Some(cantidad), Some(categoria))
            if errors.is_empty() =>
        {
            Ok(ValidatedProduct {
                nombre,
                descripcion,
                precio,
                cantidad,
                categoria,
                image_url: image.unwrap_or(DEFAULT_IMAGE_URL).to_string(),
            })
        }
        _ => Err(DraftRejection::Fields(errors)),
    }
}

fn check<T>(result: Result<T, FieldError>, errors: &mut Vec<FieldError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            errors.push(err);
            None
        }
    }
}

fn required_text(raw: &str, field: Field, errors: &mut Vec<FieldError>) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        errors.push(FieldError::new(field, FieldProblem::Required));
        return None;
    }
    Some(trimmed.to_string())
}

fn parse_precio(raw: &str) -> Result<f64, FieldError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(FieldError::new(Field::Precio, FieldProblem::Required));
    }
    let value = trimmed
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| FieldError::new(Field::Precio, FieldProblem::NotANumber))?;
    if value <= 0.0 {
        return Err(FieldError::new(Field::Precio, FieldProblem::NotPositive));
    }
    Ok(value)
}

fn parse_cantidad(raw: &str) -> Result<u64, FieldError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(FieldError::new(Field::Cantidad, FieldProblem::Required));
    }
    let value = match trimmed.parse::<i64>() {
        Ok(value) => value,
        Err(_) if trimmed.parse::<f64>().is_ok_and(f64::is_finite) => {
            return Err(FieldError::new(Field::Cantidad, FieldProblem::NotAnInteger));
        }
        Err(_) => return Err(FieldError::new(Field::Cantidad, FieldProblem::NotANumber)),
    };
    u64::try_from(value)
        .ok()
        .filter(|value| *value > 0)
        .ok_or_else(|| FieldError::new(Field::Cantidad, FieldProblem::NotPositive))
}

fn parse_categoria(raw: &str) -> Result<Category, FieldError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(FieldError::new(Field::Categoria, FieldProblem::Required));
    }
    Category::parse(trimmed)
        .ok_or_else(|| FieldError::new(Field::Categoria, FieldProblem::UnknownCategory))
}

#[cfg(test)]
mod tests {
    use super::{
        DraftRejection, Field, FieldError, FieldProblem, ProductDraft, validate_draft,
    };
    use crate::core::product::{Category, DEFAULT_IMAGE_URL, Product};
    use serde_json::json;

    fn draft(nombre: &str, cantidad: &str, precio: &str) -> ProductDraft {
        ProductDraft {
            nombre: nombre.to_string(),
            descripcion: "Cuero curtido".to_string(),
            precio: precio.to_string(),
            cantidad: cantidad.to_string(),
            categoria: "bolsos".to_string(),
            image: None,
        }
    }

    fn field_errors(result: Result<super::ValidatedProduct, DraftRejection>) -> Vec<FieldError> {
        match result {
            Err(DraftRejection::Fields(errors)) => errors,
            other => panic!("expected field errors, got {other:?}"),
        }
    }

    #[test]
    fn empty_name_is_the_only_error() {
        let errors = field_errors(validate_draft(&draft("", "5", "10"), false));
        assert_eq!(errors, vec![FieldError::new(Field::Nombre, FieldProblem::Required)]);
    }

    #[test]
    fn whitespace_only_counts_as_empty() {
        let mut input = draft("Silla", "5", "10");
        input.descripcion = "   ".to_string();
        let errors = field_errors(validate_draft(&input, false));
        assert_eq!(
            errors,
            vec![FieldError::new(Field::Descripcion, FieldProblem::Required)]
        );
    }

    #[test]
    fn zero_quantity_must_be_positive() {
        let errors = field_errors(validate_draft(&draft("Silla", "0", "10"), false));
        assert_eq!(
            errors,
            vec![FieldError::new(Field::Cantidad, FieldProblem::NotPositive)]
        );
        assert_eq!(errors[0].to_string(), "cantidad must be positive");
    }

    #[test]
    fn numeric_garbage_is_a_field_error() {
        let errors = field_errors(validate_draft(&draft("Silla", "abc", "-3"), false));
        assert_eq!(
            errors,
            vec![
                FieldError::new(Field::Precio, FieldProblem::NotPositive),
                FieldError::new(Field::Cantidad, FieldProblem::NotANumber),
            ]
        );
    }

    #[test]
    fn fractional_quantity_is_rejected() {
        let errors = field_errors(validate_draft(&draft("Silla", "2.5", "10"), false));
        assert_eq!(
            errors,
            vec![FieldError::new(Field::Cantidad, FieldProblem::NotAnInteger)]
        );
    }

    #[test]
    fn non_finite_price_is_not_a_number() {
        let errors = field_errors(validate_draft(&draft("Silla", "1", "NaN"), false));
        assert_eq!(
            errors,
            vec![FieldError::new(Field::Precio, FieldProblem::NotANumber)]
        );
    }

    #[test]
    fn category_is_required_and_closed() {
        let mut input = draft("Silla", "1", "10");
        input.categoria = String::new();
        let errors = field_errors(validate_draft(&input, false));
        assert_eq!(
            errors,
            vec![FieldError::new(Field::Categoria, FieldProblem::Required)]
        );

        input.categoria = "joyeria".to_string();
        let errors = field_errors(validate_draft(&input, false));
        assert_eq!(
            errors,
            vec![FieldError::new(Field::Categoria, FieldProblem::UnknownCategory)]
        );
    }

    #[test]
    fn missing_image_is_reported_separately() {
        let result = validate_draft(&draft("Silla", "1", "10"), true);
        assert_eq!(result, Err(DraftRejection::ImageRequired));

        let mut blank = draft("Silla", "1", "10");
        blank.image = Some("  ".to_string());
        assert_eq!(validate_draft(&blank, true), Err(DraftRejection::ImageRequired));
    }

    #[test]
    fn image_check_comes_before_field_checks() {
        let result = validate_draft(&draft("", "0", ""), true);
        assert_eq!(result, Err(DraftRejection::ImageRequired));
    }

    #[test]
    fn valid_draft_is_coerced_and_trimmed() {
        let mut input = draft("  Montura texana ", " 3 ", "1250.50");
        input.categoria = "montura".to_string();
        input.image = Some("file:///tmp/montura.jpg".to_string());
        let product = validate_draft(&input, true).expect("valid");
        assert_eq!(product.nombre, "Montura texana");
        assert_eq!(product.cantidad, 3);
        assert_eq!(product.precio, 1250.5);
        assert_eq!(product.categoria, Category::Montura);
        assert_eq!(product.image_url, "file:///tmp/montura.jpg");
    }

    #[test]
    fn placeholder_image_when_none_selected() {
        let product = validate_draft(&draft("Cinto", "2", "15"), false).expect("valid");
        assert_eq!(product.image_url, DEFAULT_IMAGE_URL);
        let document = product.to_document();
        assert_eq!(document.get("imageUrl"), Some(&json!(DEFAULT_IMAGE_URL)));
        assert_eq!(document.get("cantidad"), Some(&json!(2)));
    }

    #[test]
    fn edit_draft_round_trips_a_stored_product() {
        let stored = Product::from_document(
            "p1",
            json!({
                "nombre": "Bolso",
                "descripcion": "Grande",
                "precio": 80.5,
                "cantidad": 4,
                "categoria": "bolsos",
            })
            .as_object()
            .expect("object"),
        );
        let edit = ProductDraft::from_product(&stored);
        assert_eq!(edit.precio, "80.5");
        assert_eq!(edit.cantidad, "4");
        let product = validate_draft(&edit, false).expect("valid");
        assert_eq!(product.precio, 80.5);
        assert_eq!(product.categoria, Category::Bolsos);
    }
}
