//! # Seed Data Generator
//!
//! Populates a development database with a small almacén catalog, a few
//! account clients and the sales team.
//!
//! ## Usage
//! ```bash
//! cargo run -p mostrador-db --bin seed
//!
//! # Specify database path and stock per product
//! cargo run -p mostrador-db --bin seed -- --db ./data/mostrador.db --stock 40
//! ```
//!
//! ## Generated Data
//! - Products across five aisles, one per (name, presentation)
//! - Clients covering every tax category, with and without credit
//! - Sellers with commission rates between 2% and 5%

use chrono::Utc;
use std::env;
use uuid::Uuid;

use mostrador_core::{Client, Product, Seller, TaxCategory};
use mostrador_db::{Database, DbConfig};

/// Aisles with (product, base price in cents).
const AISLES: &[(&str, &[(&str, i64)])] = &[
    (
        "Almacén",
        &[
            ("Yerba Mate Playadito", 420000),
            ("Fideos Spaghetti Matarazzo", 135000),
            ("Arroz Largo Fino Gallo", 160000),
            ("Aceite de Girasol Natura", 310000),
            ("Harina 000 Pureza", 95000),
            ("Azúcar Ledesma", 120000),
        ],
    ),
    (
        "Bebidas",
        &[
            ("Gaseosa Cola", 250000),
            ("Agua Mineral Villavicencio", 110000),
            ("Soda en Sifón", 90000),
            ("Vino Tinto Malbec", 560000),
        ],
    ),
    (
        "Lácteos",
        &[
            ("Leche Entera La Serenísima", 130000),
            ("Dulce de Leche", 280000),
            ("Queso Cremoso", 890000),
            ("Manteca", 240000),
        ],
    ),
    (
        "Limpieza",
        &[
            ("Lavandina Ayudín", 105000),
            ("Detergente Magistral", 215000),
            ("Jabón en Polvo Ala", 470000),
        ],
    ),
    (
        "Panadería",
        &[
            ("Galletitas de Agua", 85000),
            ("Pan Lactal", 190000),
            ("Bizcochitos de Grasa", 115000),
        ],
    ),
];

/// Presentations with a price multiplier in percent.
const PRESENTATIONS: &[(&str, i64)] = &[("Unidad", 100), ("Pack x6", 560)];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./mostrador_dev.db");
    let mut stock: i64 = 25;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--stock" | "-s" => {
                if i + 1 < args.len() {
                    stock = args[i + 1].parse().unwrap_or(25);
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Mostrador Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./mostrador_dev.db)");
                println!("  -s, --stock <N>    Initial stock per product (default: 25)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Mostrador Seed Data Generator");
    println!("=============================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.products().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    // Products
    let start = std::time::Instant::now();
    let mut generated = 0;
    for (aisle, items) in AISLES {
        for (name, base_price) in items.iter() {
            for (presentation, multiplier) in PRESENTATIONS {
                let product = product(name, presentation, base_price * multiplier / 100, stock);
                if let Err(e) = db.products().insert(&product).await {
                    eprintln!("Failed to insert {}: {}", product.name, e);
                    continue;
                }
                generated += 1;
            }
        }
        println!("  {}: {} products", aisle, items.len() * PRESENTATIONS.len());
    }
    println!("✓ Generated {} products in {:?}", generated, start.elapsed());

    // Clients
    let clients = [
        ("Consumidor Final", None, None, 0),
        ("Almacén Don Pepe", Some("20-17254359-7"), Some(TaxCategory::RegisteredTaxpayer), 50_000_00),
        ("Kiosco La Esquina", Some("27-28033514-8"), Some(TaxCategory::SimplifiedRegime), 15_000_00),
        ("Cooperadora Escuela 12", Some("30-68537634-9"), Some(TaxCategory::Exempt), 30_000_00),
        ("Rosa Benítez", Some("24518877"), Some(TaxCategory::FinalConsumer), 8_000_00),
    ];
    let client_count = clients.len();
    for (name, tax_id, tax_category, limit) in clients {
        db.clients()
            .insert(&Client {
                id: Uuid::new_v4().to_string(),
                name: name.to_string(),
                phone: None,
                tax_id: tax_id.map(str::to_string),
                tax_category,
                credit_limit_cents: limit,
                balance_cents: 0,
                created_at: Utc::now(),
            })
            .await?;
    }
    println!("✓ Generated {} clients", client_count);

    // Sellers
    let sellers = [("Marta Gómez", 300), ("Julián Ortiz", 500), ("Caja Mostrador", 200)];
    let seller_count = sellers.len();
    for (name, rate_bps) in sellers {
        db.sellers()
            .insert(&Seller {
                id: Uuid::new_v4().to_string(),
                name: name.to_string(),
                commission_rate_bps: rate_bps,
                total_sales_cents: 0,
                total_commission_cents: 0,
                created_at: Utc::now(),
            })
            .await?;
    }
    println!("✓ Generated {} sellers", seller_count);

    println!();
    println!("Catalog sample:");
    for p in db.products().list_enabled(5).await? {
        println!("  {:<40} {:>12}  stock {}", p.name, p.price().to_string(), p.stock);
    }

    println!();
    println!("✓ Seed complete!");

    Ok(())
}

fn product(name: &str, presentation: &str, price_cents: i64, stock: i64) -> Product {
    let now = Utc::now();
    Product {
        id: Uuid::new_v4().to_string(),
        name: format!("{} ({})", name, presentation),
        price_cents,
        stock,
        is_enabled: true,
        created_at: now,
        updated_at: now,
    }
}
