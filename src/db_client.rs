use std::{env, sync::Arc};

use tokio_postgres::{types::ToSql, Client, NoTls, Row};

/// Tables are bootstrapped at startup. The primary key on `owner_cars.car_id`
/// is the store-level guarantee that a car belongs to at most one owner, even
/// when two requests race past the application-side scan.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS cars (
	car_id UUID PRIMARY KEY,
	model TEXT NOT NULL,
	car_type TEXT NOT NULL,
	registration_number TEXT NOT NULL UNIQUE,
	location TEXT NOT NULL,
	price_per_day DOUBLE PRECISION NOT NULL,
	year INT NOT NULL,
	transmission TEXT NOT NULL,
	fuel TEXT NOT NULL,
	seats INT NOT NULL,
	features TEXT[] NOT NULL DEFAULT '{}',
	image TEXT NOT NULL,
	schedule DATE[] NOT NULL DEFAULT '{}',
	created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE TABLE IF NOT EXISTS car_owners (
	owner_id UUID PRIMARY KEY,
	name TEXT NOT NULL,
	email TEXT NOT NULL UNIQUE,
	phone TEXT NOT NULL UNIQUE,
	location TEXT NOT NULL,
	joined_date TEXT NOT NULL,
	status TEXT NOT NULL,
	created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE TABLE IF NOT EXISTS owner_cars (
	car_id UUID PRIMARY KEY,
	owner_id UUID NOT NULL
);
CREATE TABLE IF NOT EXISTS car_categories (
	category_id UUID PRIMARY KEY,
	title TEXT NOT NULL,
	description TEXT NOT NULL,
	price_from TEXT NOT NULL,
	features TEXT[] NOT NULL DEFAULT '{}',
	popular BOOL NOT NULL DEFAULT false,
	image TEXT NOT NULL,
	created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE TABLE IF NOT EXISTS bookings (
	booking_id UUID PRIMARY KEY,
	booking_code TEXT NOT NULL UNIQUE,
	car_id UUID NOT NULL,
	registration_number TEXT NOT NULL,
	model TEXT NOT NULL,
	pickup_date DATE NOT NULL,
	return_date DATE NOT NULL,
	total_amount DOUBLE PRECISION NOT NULL,
	status TEXT NOT NULL DEFAULT 'pending',
	customer_name TEXT NOT NULL,
	customer_email TEXT NOT NULL,
	customer_phone TEXT NOT NULL,
	customer_id_number TEXT NOT NULL,
	special_requests TEXT,
	created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE TABLE IF NOT EXISTS messages (
	message_id UUID PRIMARY KEY,
	sender_name TEXT NOT NULL,
	sender_email TEXT NOT NULL,
	subject TEXT NOT NULL,
	body TEXT NOT NULL,
	created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
";

#[derive(Clone)]
pub struct DbClient(pub Arc<Client>);

impl DbClient {
	pub async fn connect() -> anyhow::Result<DbClient> {
		let host = env::var("PGHOST").unwrap_or_else(|_| "localhost".to_string());
		let user = env::var("PGUSER").unwrap_or_else(|_| "postgres".to_string());
		let password = env::var("PGPASSWORD").unwrap_or_else(|_| "postgres".to_string());
		let dbname = env::var("PGDATABASE").unwrap_or_else(|_| "fleet".to_string());
		let config_string = format!("host={} user={} password={} dbname={}", host, user, password, dbname);
		let (client, monitor) = tokio_postgres::connect(config_string.as_str(), NoTls).await?;

		tokio::spawn(async move {
			if let Err(e) = monitor.await {
				log::error!("connection error: {}", e);
			}
		});

		client.batch_execute(SCHEMA).await?;
		Ok(DbClient(Arc::new(client)))
	}

	pub async fn query(&self, statement: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Vec<Row>, tokio_postgres::Error> {
		self.0.query(statement, params).await
	}

	pub async fn query_opt(&self, statement: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Option<Row>, tokio_postgres::Error> {
		self.0.query_opt(statement, params).await
	}

	pub async fn execute(&self, statement: &str, params: &[&(dyn ToSql + Sync)]) -> Result<u64, tokio_postgres::Error> {
		self.0.execute(statement, params).await
	}
}
