//! Cart and checkout route handlers.
//!
//! Cart operations use HTMX for dynamic updates without full page reloads.
//! Each browser gets a cart token in its session; the token selects the
//! browser's [`CartSynchronizer`] in [`crate::sessions::CartSessions`].

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    http::HeaderMap,
    response::{AppendHeaders, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;
use uuid::Uuid;

use tienda_core::{OrderSummary, ProductId};

use super::Layout;
use crate::cart::{CartState, CartSynchronizer, Outcome};
use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::current_user;
use crate::models::session::keys;
use crate::sessions::CartHandle;
use crate::state::AppState;

/// Cart item display data for templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartItemView {
    pub product_id: i32,
    pub name: String,
    pub image: String,
    pub quantity: u32,
    pub price: String,
    pub line_price: String,
    /// A change to this line is still in flight.
    pub busy: bool,
}

/// Cart display data for templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartView {
    pub items: Vec<CartItemView>,
    pub subtotal: String,
    pub item_count: u32,
    /// A sign-in is still fetching the account's cart.
    pub syncing: bool,
}

impl CartView {
    /// Build the view of `state`, asking `is_busy` which lines are in flight.
    #[must_use]
    pub fn new(state: &CartState, is_busy: impl Fn(ProductId) -> bool) -> Self {
        Self {
            items: state
                .entries()
                .iter()
                .map(|e| CartItemView {
                    product_id: e.product_id.as_i32(),
                    name: e.name.clone(),
                    image: e.image.clone(),
                    quantity: e.quantity,
                    price: e.unit_price.to_string(),
                    line_price: e.line_total().to_string(),
                    busy: is_busy(e.product_id),
                })
                .collect(),
            subtotal: state.subtotal().to_string(),
            item_count: state.item_count(),
            syncing: state.phase().is_syncing(),
        }
    }

    fn of(sync: &CartSynchronizer) -> Self {
        Self::new(&sync.snapshot(), |id| sync.is_busy(id))
    }
}

/// One line of the order summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryLineView {
    pub name: String,
    pub quantity: u32,
    pub price: String,
    pub line_price: String,
}

/// Order summary display data for templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryView {
    pub lines: Vec<SummaryLineView>,
    pub subtotal: String,
    pub service_charge: String,
    pub total: String,
}

impl From<&OrderSummary> for SummaryView {
    fn from(summary: &OrderSummary) -> Self {
        Self {
            lines: summary
                .lines
                .iter()
                .map(|l| SummaryLineView {
                    name: l.name.clone(),
                    quantity: l.quantity,
                    price: l.unit_price.to_string(),
                    line_price: l.line_total.to_string(),
                })
                .collect(),
            subtotal: summary.subtotal.to_string(),
            service_charge: summary.service_charge.to_string(),
            total: summary.total.to_string(),
        }
    }
}

// =============================================================================
// Session Helpers
// =============================================================================

/// Get this browser's cart token, creating one on first use.
async fn cart_token(session: &Session) -> Result<Uuid> {
    if let Some(token) = session.get::<Uuid>(keys::CART_TOKEN).await? {
        return Ok(token);
    }
    let token = Uuid::new_v4();
    session.insert(keys::CART_TOKEN, token).await?;
    Ok(token)
}

/// Open this browser's cart. A new cart starts out owned by the session's user.
pub(crate) async fn open_cart(state: &AppState, session: &Session) -> Result<CartHandle> {
    let token = cart_token(session).await?;
    let user = current_user(session).await.map(|u| u.id);
    Ok(state.carts().open(token, user).await?)
}

/// Move this browser's cart to the session's current user after a login or
/// logout.
pub(crate) async fn switch_cart(state: &AppState, session: &Session) -> Result<CartHandle> {
    let token = cart_token(session).await?;
    let user = current_user(session).await.map(|u| u.id);
    Ok(state.carts().switch(token, user).await?)
}

// =============================================================================
// Forms and Queries
// =============================================================================

/// Add to cart form data.
#[derive(Debug, Deserialize)]
pub struct AddToCartForm {
    pub product_id: ProductId,
}

/// Quantity change form data. `delta` is usually `1` or `-1`.
#[derive(Debug, Deserialize)]
pub struct UpdateCartForm {
    pub product_id: ProductId,
    pub delta: i32,
}

/// Remove from cart form data.
#[derive(Debug, Deserialize)]
pub struct RemoveFromCartForm {
    pub product_id: ProductId,
}

/// Query parameters for the cart page.
#[derive(Debug, Deserialize)]
pub struct CartQuery {
    pub purchased: Option<bool>,
}

// =============================================================================
// Templates
// =============================================================================

/// Cart page template.
#[derive(Template, WebTemplate)]
#[template(path = "cart/show.html")]
pub struct CartShowTemplate {
    pub layout: Layout,
    pub cart: CartView,
    pub purchased: bool,
}

/// Checkout summary page template.
#[derive(Template, WebTemplate)]
#[template(path = "cart/checkout.html")]
pub struct CheckoutTemplate {
    pub layout: Layout,
    pub summary: SummaryView,
}

/// Cart items fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/cart_items.html")]
pub struct CartItemsTemplate {
    pub cart: CartView,
}

/// Cart count badge fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/cart_count.html")]
pub struct CartCountTemplate {
    pub count: u32,
}

fn cart_updated(body: impl IntoResponse) -> Response {
    (AppendHeaders([("HX-Trigger", "cart-updated")]), body).into_response()
}

/// Redirect to `to`. HTMX requests get `HX-Redirect` so the browser does a
/// full page load instead of swapping the target page into the form.
fn redirect(headers: &HeaderMap, to: &str) -> Response {
    if headers.contains_key("HX-Request") {
        return (AppendHeaders([("HX-Redirect", to.to_owned())]), ()).into_response();
    }
    Redirect::to(to).into_response()
}

// =============================================================================
// Cart Routes
// =============================================================================

/// Display cart page.
#[instrument(skip(state, session))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<CartQuery>,
) -> Result<impl IntoResponse> {
    let cart = open_cart(&state, &session).await?;
    let view = CartView::of(cart.sync());

    Ok(CartShowTemplate {
        layout: Layout::for_session(&session).await,
        cart: view,
        purchased: query.purchased.unwrap_or(false),
    })
}

/// Add one unit of a product (HTMX).
///
/// Returns the updated count badge and triggers `cart-updated`.
#[instrument(skip(state, session))]
pub async fn add(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<AddToCartForm>,
) -> Result<Response> {
    let cart = open_cart(&state, &session).await?;
    let outcome = cart.sync().add_item(form.product_id).await?;
    if matches!(outcome, Outcome::Queued) {
        tracing::debug!("add queued until the cart finishes syncing");
    }
    add_breadcrumb(
        "cart",
        "Added to cart",
        Some(&[("product_id", &form.product_id.to_string())]),
    );

    Ok(cart_updated(CartCountTemplate {
        count: cart.latest().item_count(),
    }))
}

/// Change a line's quantity (HTMX). Reaching zero removes the line.
#[instrument(skip(state, session))]
pub async fn update(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<UpdateCartForm>,
) -> Result<Response> {
    let cart = open_cart(&state, &session).await?;
    cart.sync()
        .change_quantity(form.product_id, form.delta)
        .await?;

    Ok(cart_updated(CartItemsTemplate {
        cart: CartView::of(cart.sync()),
    }))
}

/// Remove a line (HTMX).
#[instrument(skip(state, session))]
pub async fn remove(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<RemoveFromCartForm>,
) -> Result<Response> {
    let cart = open_cart(&state, &session).await?;
    cart.sync().remove_item(form.product_id).await?;

    Ok(cart_updated(CartItemsTemplate {
        cart: CartView::of(cart.sync()),
    }))
}

/// Get cart count badge (HTMX).
#[instrument(skip(state, session))]
pub async fn count(State(state): State<AppState>, session: Session) -> Result<impl IntoResponse> {
    let cart = open_cart(&state, &session).await?;
    Ok(CartCountTemplate {
        count: cart.latest().item_count(),
    })
}

// =============================================================================
// Checkout Routes
// =============================================================================

/// Display the order summary. An empty cart redirects to the cart page.
#[instrument(skip(state, session))]
pub async fn checkout(State(state): State<AppState>, session: Session) -> Result<Response> {
    let cart = open_cart(&state, &session).await?;
    let summary = cart.sync().checkout();
    if summary.is_empty() {
        return Ok(Redirect::to("/cart").into_response());
    }

    Ok(CheckoutTemplate {
        layout: Layout::for_session(&session).await,
        summary: SummaryView::from(&summary),
    }
    .into_response())
}

/// Confirm the purchase: empty the cart and show the success notice.
///
/// The confirm button is disabled while the request is in flight.
#[instrument(skip(state, session, headers))]
pub async fn confirm(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
) -> Result<Response> {
    let cart = open_cart(&state, &session).await?;
    if cart.sync().checkout().is_empty() {
        return Ok(redirect(&headers, "/cart"));
    }

    match cart.sync().confirm_purchase().await? {
        Outcome::Applied(_) => {
            tracing::info!("purchase confirmed");
            Ok(redirect(&headers, "/cart?purchased=true"))
        }
        Outcome::Queued | Outcome::Superseded => Err(AppError::Cart(
            crate::cart::CartError::TransitionInProgress,
        )),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::{HeaderValue, StatusCode, header};
    use rust_decimal::Decimal;
    use tienda_core::{CartEntry, Category, CurrencyCode, Price, Product};

    use super::*;

    fn entries() -> Vec<CartEntry> {
        let product = |id: i32, price: i64| Product {
            id: ProductId::new(id),
            name: format!("Servicio {id}"),
            description: String::new(),
            price: Price::new(Decimal::from(price), CurrencyCode::USD),
            image: String::new(),
            category: Category::Education,
        };
        vec![
            CartEntry::from_product(&product(1, 1500), 2),
            CartEntry::from_product(&product(2, 75), 1),
        ]
    }

    #[test]
    fn test_cart_view_formats_prices() {
        let mut state = CartState::new();
        state.replace_entries(entries());

        let view = CartView::new(&state, |id| id == ProductId::new(2));

        assert_eq!(view.item_count, 3);
        assert_eq!(view.subtotal, "$3075.00");
        assert_eq!(view.items[0].line_price, "$3000.00");
        assert!(!view.items[0].busy);
        assert!(view.items[1].busy);
        assert!(!view.syncing);
    }

    #[test]
    fn test_summary_view_has_zero_service_charge() {
        let summary = OrderSummary::from_entries(&entries());
        let view = SummaryView::from(&summary);

        assert_eq!(view.lines.len(), 2);
        assert_eq!(view.service_charge, "$0.00");
        assert_eq!(view.total, view.subtotal);
    }

    #[test]
    fn test_busy_lines_render_disabled_controls() {
        let mut state = CartState::new();
        state.replace_entries(entries());
        let cart = CartView::new(&state, |id| id == ProductId::new(2));

        let html = CartItemsTemplate { cart }.render().unwrap();

        // Every control disables itself while its request is in flight
        assert_eq!(html.matches(r#"hx-disabled-elt="this""#).count(), 6);
        // Only the busy line's three controls start out disabled
        assert_eq!(html.matches(" disabled>").count(), 3);
        let busy_line = html.split("<li").nth(2).unwrap();
        assert_eq!(busy_line.matches(" disabled>").count(), 3);
    }

    #[test]
    fn test_checkout_disables_confirm_on_submit() {
        let summary = OrderSummary::from_entries(&entries());
        let html = CheckoutTemplate {
            layout: Layout { user_email: None },
            summary: SummaryView::from(&summary),
        }
        .render()
        .unwrap();

        assert!(html.contains(r#"hx-post="/checkout/confirm" hx-disabled-elt="find button""#));
    }

    #[test]
    fn test_redirect_uses_hx_redirect_for_htmx() {
        let mut headers = HeaderMap::new();
        let plain = redirect(&headers, "/cart");
        assert_eq!(plain.status(), StatusCode::SEE_OTHER);
        assert_eq!(plain.headers()[header::LOCATION], "/cart");

        headers.insert("HX-Request", HeaderValue::from_static("true"));
        let htmx = redirect(&headers, "/cart?purchased=true");
        assert_eq!(htmx.status(), StatusCode::OK);
        assert_eq!(htmx.headers()["HX-Redirect"], "/cart?purchased=true");
    }
}
