use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

/// Registers the `Bearer` scheme referenced by authenticated paths
struct BearerSecurity;

impl Modify for BearerSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "Bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Online Pharmacy API",
        version = "0.1.0",
        description = r#"
# Online Pharmacy

Storefront and back office of an online pharmacy: browse the catalog, fill a
cart, check out, follow orders and download invoices. Staff manage the catalog,
stock movements and the order lifecycle.

## Authentication

Register or log in to obtain a JWT and send it in the Authorization header:

```
Authorization: Bearer <token>
```

Staff endpoints additionally require the `staff` role.

## Pagination

List endpoints accept `page` (1-based) and `per_page` (max 100).
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "auth", description = "Registration, login and logout"),
        (name = "profile", description = "The caller's account"),
        (name = "catalog", description = "Public catalog"),
        (name = "catalog-admin", description = "Staff catalog management"),
        (name = "cart", description = "The caller's cart"),
        (name = "checkout", description = "Order placement"),
        (name = "orders", description = "Order history and invoices"),
        (name = "orders-admin", description = "Staff order management"),
        (name = "inventory", description = "Staff stock management")
    ),
    paths(
        crate::handlers::accounts::register,
        crate::handlers::accounts::login,
        crate::handlers::accounts::logout,
        crate::handlers::accounts::get_profile,
        crate::handlers::accounts::update_profile,

        crate::handlers::catalog::home,
        crate::handlers::catalog::list_categories,
        crate::handlers::catalog::get_category,
        crate::handlers::catalog::create_category,
        crate::handlers::catalog::update_category,
        crate::handlers::catalog::delete_category,
        crate::handlers::catalog::list_medicines,
        crate::handlers::catalog::get_medicine,
        crate::handlers::catalog::list_all_medicines,
        crate::handlers::catalog::get_any_medicine,
        crate::handlers::catalog::create_medicine,
        crate::handlers::catalog::update_medicine,
        crate::handlers::catalog::delete_medicine,

        crate::handlers::cart::get_cart,
        crate::handlers::cart::add_cart_item,
        crate::handlers::cart::update_cart_item,
        crate::handlers::cart::remove_cart_item,
        crate::handlers::cart::checkout,

        crate::handlers::orders::list_my_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::download_invoice,
        crate::handlers::orders::list_all_orders,
        crate::handlers::orders::update_order_status,

        crate::handlers::inventory::dashboard,
        crate::handlers::inventory::list_movements,
        crate::handlers::inventory::low_stock,
        crate::handlers::inventory::update_stock,
    ),
    components(
        schemas(
            crate::entities::OrderStatus,
            crate::entities::MovementType,
            crate::services::cart::CartAction,
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&BearerSecurity)
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_storefront_paths() {
        let openapi = ApiDocV1::openapi();
        let json = serde_json::to_string_pretty(&openapi).unwrap();
        assert!(json.contains("Online Pharmacy API"));
        assert!(json.contains("/api/v1/checkout"));
        assert!(json.contains("/api/v1/orders/{id}/invoice"));
        assert!(json.contains("\"Bearer\""));
    }
}
