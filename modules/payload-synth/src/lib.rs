//! Heuristic request-body generation keyed on endpoint naming.
//!
//! When discovery finds a mutating endpoint but no historical payload exists,
//! a body is fabricated from an ordered rule table: the first rule whose
//! keyword matches the (lowercased) path decides the field template. Shapes
//! are deterministic per category; values are randomized on every call.

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use serde_json::{json, Value};

pub const MUTATING_METHODS: &[&str] = &["POST", "PUT", "PATCH"];

pub fn is_mutating(method: &str) -> bool {
    MUTATING_METHODS.contains(&method.to_ascii_uppercase().as_str())
}

fn rand_string(len: usize) -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

fn rand_email() -> String {
    format!("test_{}@example.com", rand_string(8))
}

fn rand_password() -> String {
    rand_string(10)
}

fn rand_phone() -> String {
    format!("09{}", thread_rng().gen_range(10_000_000u32..100_000_000))
}

fn rand_date() -> String {
    let mut rng = thread_rng();
    format!(
        "{}-{:02}-{:02}",
        rng.gen_range(2020..=2025),
        rng.gen_range(1..=12),
        rng.gen_range(1..=28)
    )
}

fn rand_price() -> f64 {
    (thread_rng().gen_range(10.0..1000.0f64) * 100.0).round() / 100.0
}

type Template = fn() -> Value;

/// Evaluated top to bottom; the specific authentication rules sit above the
/// generic user rule so `/auth/login` never falls through to it.
const RULES: &[(&[&str], Template)] = &[
    (&["login"], login_body),
    (&["register"], register_body),
    (&["user", "auth"], user_body),
    (&["product"], product_body),
    (&["order"], order_body),
    (&["comment", "review"], comment_body),
    (&["categor"], category_body),
];

fn login_body() -> Value {
    json!({ "email": rand_email(), "password": rand_password() })
}

fn register_body() -> Value {
    json!({
        "name": format!("Test User {}", rand_string(5)),
        "email": rand_email(),
        "password": rand_password(),
    })
}

fn user_body() -> Value {
    json!({
        "name": format!("Test User {}", rand_string(5)),
        "email": rand_email(),
        "password": rand_password(),
        "phone": rand_phone(),
    })
}

fn product_body() -> Value {
    let mut rng = thread_rng();
    json!({
        "name": format!("Test Product {}", rand_string(5)),
        "description": format!("Test product description {}", rand_string(20)),
        "price": rand_price(),
        "category_id": rng.gen_range(1..=10),
        "stock": rng.gen_range(1..=100),
    })
}

fn order_body() -> Value {
    let mut rng = thread_rng();
    let payment = ["credit_card", "paypal", "bank_transfer"][rng.gen_range(0..3)];
    json!({
        "user_id": rng.gen_range(1..=10),
        "products": [
            { "product_id": rng.gen_range(1..=100), "quantity": rng.gen_range(1..=5) },
            { "product_id": rng.gen_range(1..=100), "quantity": rng.gen_range(1..=5) },
        ],
        "shipping_address": format!("Test Address {}", rand_string(10)),
        "payment_method": payment,
    })
}

fn comment_body() -> Value {
    let mut rng = thread_rng();
    json!({
        "user_id": rng.gen_range(1..=10),
        "product_id": rng.gen_range(1..=100),
        "rating": rng.gen_range(1..=5),
        "content": format!("Test comment {}", rand_string(30)),
    })
}

fn category_body() -> Value {
    json!({
        "name": format!("Test Category {}", rand_string(5)),
        "description": format!("Test category description {}", rand_string(20)),
    })
}

fn generic_body() -> Value {
    let mut rng = thread_rng();
    json!({
        "name": format!("Test {}", rand_string(5)),
        "description": format!("Test description {}", rand_string(20)),
        "value": rng.gen_range(1..=100),
        "date": rand_date(),
        "active": rng.gen_bool(0.5),
    })
}

/// Build a plausible body for `method` against `path`. Non-mutating methods
/// carry no payload and get an empty object.
pub fn synthesize(path: &str, method: &str) -> Value {
    if !is_mutating(method) {
        return json!({});
    }
    let lowered = path.to_ascii_lowercase();
    for (keywords, template) in RULES {
        if keywords.iter().any(|k| lowered.contains(k)) {
            return template();
        }
    }
    generic_body()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(v: &Value) -> Vec<String> {
        v.as_object()
            .expect("synthesized bodies are objects")
            .keys()
            .cloned()
            .collect()
    }

    #[test]
    fn non_mutating_methods_get_empty_objects() {
        assert_eq!(synthesize("/api/users", "GET"), json!({}));
        assert_eq!(synthesize("/api/users", "DELETE"), json!({}));
    }

    #[test]
    fn login_shape_is_stable_but_values_vary() {
        let a = synthesize("/api/auth/login", "POST");
        let b = synthesize("/api/auth/login", "POST");
        assert_eq!(keys(&a), vec!["email", "password"]);
        assert_eq!(keys(&b), vec!["email", "password"]);
        assert_ne!(a["password"], b["password"]);
    }

    #[test]
    fn register_beats_the_generic_auth_rule() {
        let body = synthesize("/api/auth/register", "PUT");
        assert_eq!(keys(&body), vec!["name", "email", "password"]);
    }

    #[test]
    fn category_keyword_matches_plural_and_singular() {
        assert_eq!(
            keys(&synthesize("/api/categories", "POST")),
            vec!["name", "description"]
        );
        assert_eq!(
            keys(&synthesize("/category", "POST")),
            vec!["name", "description"]
        );
    }

    #[test]
    fn order_bodies_nest_product_lines() {
        let body = synthesize("/api/orders", "POST");
        let products = body["products"].as_array().unwrap();
        assert_eq!(products.len(), 2);
        assert!(products[0]["product_id"].is_number());
    }

    #[test]
    fn unknown_paths_fall_back_to_the_generic_shape() {
        let body = synthesize("/api/widgets", "POST");
        assert_eq!(
            keys(&body),
            vec!["name", "description", "value", "date", "active"]
        );
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert_eq!(
            keys(&synthesize("/API/Auth/LOGIN", "patch")),
            vec!["email", "password"]
        );
    }
}
