use std::env;

use axum::{
	extract::DefaultBodyLimit,
	routing::{get, post, Router},
};
use tower_http::cors::CorsLayer;

mod bookings;
mod cars;
mod categories;
mod customers;
mod db_client;
mod error;
mod image_store;
mod owners;
mod payload;

use bookings::bookings::{create_booking, delete_booking, get_booking, get_bookings, update_booking};
use cars::cars::{create_car, delete_car, get_car, get_cars, update_car};
use categories::categories::{create_category, delete_category, get_categories, get_category, update_category};
use customers::customers::{get_customers, get_message, get_messages};
use db_client::DbClient;
use image_store::{image_handler, ImageStore};
use owners::owners::{create_owner, delete_owner, get_owner, get_owners, update_owner};

#[derive(Clone)]
pub struct AppState {
	pub db: DbClient,
	pub images: ImageStore,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	env_logger::init();

	let addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:4000".to_string());
	let image_root = env::var("IMAGE_DIR").unwrap_or_else(|_| "images".to_string());

	let db = DbClient::connect().await?;
	let state = AppState { db, images: ImageStore::new(image_root) };

	let app = Router::new()
		.route("/booking", post(create_booking).get(get_bookings))
		.route("/booking/:id", get(get_booking).patch(update_booking).delete(delete_booking))
		.route("/carowners", post(create_owner).get(get_owners))
		.route("/carowners/:id", get(get_owner).put(update_owner).delete(delete_owner))
		.route("/cars", post(create_car).get(get_cars))
		.route("/cars/:id", get(get_car).put(update_car).delete(delete_car))
		.route("/category", post(create_category).get(get_categories))
		.route("/category/:id", get(get_category).put(update_category).delete(delete_category))
		.route("/customers", get(get_customers))
		.route("/messages", get(get_messages))
		.route("/messages/:id", get(get_message))
		.route("/images/:folder/:file", get(image_handler))
		.layer(DefaultBodyLimit::max(8 * 1024 * 1024))
		.layer(CorsLayer::permissive())
		.with_state(state);

	log::info!("listening on {}", addr);
	let listener = tokio::net::TcpListener::bind(&addr).await?;
	axum::serve(listener, app).await?;
	Ok(())
}
