// Pure views derived from an in-memory product list: search and category totals.
// Nothing here touches a store; callers recompute after each state change.
use indexmap::IndexMap;
use serde_json::{Value, json};

use crate::core::product::Product;

/// Leather tones assigned to categories by output position.
pub const PALETTE: [&str; 8] = [
    "#8B4513", "#A0522D", "#D2691E", "#C19A6B", "#F4A460", "#DEB887", "#D2B48C", "#CD853F",
];

#[derive(Clone, Debug, PartialEq)]
pub struct CategoryTotal {
    pub category: String,
    pub total_quantity: f64,
    pub color: &'static str,
}

impl CategoryTotal {
    pub fn to_json(&self) -> Value {
        json!({
            "category": self.category,
            "totalQuantity": self.total_quantity,
            "color": self.color,
        })
    }
}

/// Products whose name contains `query` (ignoring case) or whose price text does.
pub fn filter_products(products: &[Product], query: &str) -> Vec<Product> {
    if query.is_empty() {
        return products.to_vec();
    }
    let needle = query.to_lowercase();
    products
        .iter()
        .filter(|product| matches_query(product, &needle))
        .cloned()
        .collect()
}

fn matches_query(product: &Product, needle: &str) -> bool {
    let by_name = product
        .nombre
        .as_deref()
        .is_some_and(|nombre| nombre.to_lowercase().contains(needle));
    by_name
        || product
            .precio_text()
            .is_some_and(|precio| precio.contains(needle))
}

/// Whether a product counts toward category totals.
pub fn is_aggregatable(product: &Product) -> bool {
    let has_category = product
        .categoria
        .as_deref()
        .is_some_and(|categoria| !categoria.is_empty());
    has_category && positive_quantity(product).is_some()
}

fn positive_quantity(product: &Product) -> Option<f64> {
    product
        .cantidad
        .as_ref()
        .and_then(|cantidad| cantidad.as_f64())
        .filter(|cantidad| *cantidad > 0.0)
}

/// Stock summed per category, in first-seen category order.
pub fn aggregate_by_category(products: &[Product]) -> Vec<CategoryTotal> {
    let mut totals: IndexMap<&str, f64> = IndexMap::new();
    for product in products {
        let Some(categoria) = product.categoria.as_deref().filter(|c| !c.is_empty()) else {
            continue;
        };
        let Some(cantidad) = positive_quantity(product) else {
            continue;
        };
        *totals.entry(categoria).or_insert(0.0) += cantidad;
    }

    totals
        .into_iter()
        .enumerate()
        .map(|(index, (category, total_quantity))| CategoryTotal {
            category: category.to_string(),
            total_quantity,
            color: PALETTE[index % PALETTE.len()],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{PALETTE, aggregate_by_category, filter_products, is_aggregatable};
    use crate::core::product::Product;
    use serde_json::{Value, json};

    fn product(id: &str, data: Value) -> Product {
        Product::from_document(id, data.as_object().expect("object"))
    }

    fn stock(id: &str, categoria: &str, cantidad: Value) -> Product {
        product(id, json!({"categoria": categoria, "cantidad": cantidad}))
    }

    fn catalog() -> Vec<Product> {
        vec![
            product("a", json!({"nombre": "Montura Texana", "precio": 1250})),
            product("b", json!({"nombre": "Cinto de cuero", "precio": 35.5})),
            product("c", json!({"nombre": "Bolso tejido", "precio": 120})),
            product("d", json!({"precio": 12})),
        ]
    }

    fn ids(products: &[Product]) -> Vec<&str> {
        products.iter().map(|product| product.id.as_str()).collect()
    }

    #[test]
    fn empty_query_returns_input_in_order() {
        let products = catalog();
        assert_eq!(filter_products(&products, ""), products);
        assert!(filter_products(&[], "").is_empty());
    }

    #[test]
    fn name_match_ignores_case() {
        let products = catalog();
        assert_eq!(ids(&filter_products(&products, "MONTURA")), vec!["a"]);
        assert_eq!(ids(&filter_products(&products, "cuero")), vec!["b"]);
    }

    #[test]
    fn price_match_uses_decimal_text() {
        let products = catalog();
        assert_eq!(ids(&filter_products(&products, "35.5")), vec!["b"]);
        assert_eq!(ids(&filter_products(&products, "12")), vec!["a", "c", "d"]);
    }

    #[test]
    fn missing_name_still_checks_price() {
        let products = catalog();
        assert_eq!(ids(&filter_products(&products, "bolso")), vec!["c"]);
        let missing = vec![product("x", json!({}))];
        assert!(filter_products(&missing, "x").is_empty());
    }

    #[test]
    fn filtered_items_are_a_matching_subset() {
        let products = catalog();
        for query in ["o", "5", "T", "zzz", "1"] {
            let filtered = filter_products(&products, query);
            let needle = query.to_lowercase();
            for item in &filtered {
                assert!(products.contains(item));
                let by_name = item
                    .nombre
                    .as_deref()
                    .is_some_and(|nombre| nombre.to_lowercase().contains(&needle));
                let by_price = item
                    .precio_text()
                    .is_some_and(|precio| precio.contains(&needle));
                assert!(by_name || by_price, "{query} vs {}", item.id);
            }
        }
    }

    #[test]
    fn aggregate_of_nothing_is_empty() {
        assert!(aggregate_by_category(&[]).is_empty());
    }

    #[test]
    fn aggregate_sums_in_arrival_order() {
        let products = vec![
            stock("1", "bolsos", json!(3)),
            stock("2", "calzado", json!(2)),
            stock("3", "bolsos", json!(5)),
        ];
        let totals = aggregate_by_category(&products);
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[0].category, "bolsos");
        assert_eq!(totals[0].total_quantity, 8.0);
        assert_eq!(totals[0].color, PALETTE[0]);
        assert_eq!(totals[1].category, "calzado");
        assert_eq!(totals[1].total_quantity, 2.0);
        assert_eq!(totals[1].color, PALETTE[1]);
    }

    #[test]
    fn invalid_quantities_are_excluded() {
        let products = vec![
            stock("1", "bolsos", json!(-1)),
            stock("2", "bolsos", json!("abc")),
            stock("3", "hogar", json!(0)),
            product("4", json!({"categoria": "hogar"})),
            stock("5", "", json!(4)),
            product("6", json!({"cantidad": 9})),
            stock("7", "calzado", json!("2")),
        ];
        let totals = aggregate_by_category(&products);
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[0].category, "calzado");
        assert_eq!(totals[0].total_quantity, 2.0);
        assert_eq!(products.iter().filter(|p| is_aggregatable(p)).count(), 1);
    }

    #[test]
    fn palette_cycles_after_eight_groups() {
        let products = (0..10)
            .map(|index| stock(&index.to_string(), &format!("cat{index}"), json!(1)))
            .collect::<Vec<_>>();
        let totals = aggregate_by_category(&products);
        assert_eq!(totals.len(), 10);
        assert_eq!(totals[8].color, PALETTE[0]);
        assert_eq!(totals[9].color, PALETTE[1]);
        assert_eq!(totals[9].to_json()["totalQuantity"], json!(1.0));
    }
}
