// SPDX-License-Identifier: AGPL-3.0-or-later
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use harvest_market_rs::external::{
    MemoryNotifier, MemoryProofStore, ProofUpload, SimulatedGateway,
};
use harvest_market_rs::{
    DealId, Engine, InterestId, ListingId, ProductId, Region, Unit, UserId,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

/// Harvest Market - Process marketplace event CSV files
///
/// Reads marketplace events from a CSV file, replays them through the
/// engine and outputs the resulting deals to stdout.
#[derive(Parser, Debug)]
#[command(name = "harvest-market-rs")]
#[command(about = "A produce marketplace engine that replays event CSVs", long_about = None)]
struct Args {
    /// Path to CSV file with marketplace events
    ///
    /// Expected format: event,actor,product,quantity,unit,price,region,interest,listing,deal,file
    /// Example: cargo run -- events.csv > deals.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    let engine = Engine::new(
        Arc::new(MemoryNotifier::default()),
        Arc::new(SimulatedGateway),
        Arc::new(MemoryProofStore::default()),
    );
    if let Err(e) = process_events(&engine, BufReader::new(file)) {
        eprintln!("Error processing events: {}", e);
        process::exit(1);
    }

    if let Err(e) = write_deals(&engine, std::io::stdout()) {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

/// Raw CSV record matching the input format.
///
/// Fields: `event, actor, product, quantity, unit, price, region, interest,
/// listing, deal, file` — only `event` and `actor` are always present.
#[derive(Debug, Deserialize)]
struct CsvRecord {
    event: String,
    actor: u32,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    product: Option<u32>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    quantity: Option<Decimal>,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    price: Option<Decimal>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    interest: Option<u64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    listing: Option<u64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    deal: Option<u64>,
    #[serde(default)]
    file: Option<String>,
}

/// One replayable marketplace event.
#[derive(Debug)]
enum MarketEvent {
    List {
        producer: UserId,
        product: ProductId,
        quantity: Decimal,
        unit: Unit,
        price: Option<Decimal>,
        region: Region,
    },
    Withdraw {
        producer: UserId,
        listing: ListingId,
    },
    Interest {
        buyer: UserId,
        product: ProductId,
        quantity: Decimal,
        unit: Unit,
        ceiling: Option<Decimal>,
        region: Region,
    },
    Decline {
        interest: InterestId,
    },
    Accept {
        producer: UserId,
        interest: InterestId,
        listing: ListingId,
    },
    Pay {
        buyer: UserId,
        deal: DealId,
    },
    Proof {
        buyer: UserId,
        deal: DealId,
        filename: String,
    },
    Validate {
        deal: DealId,
    },
    RejectPayment {
        deal: DealId,
    },
    Deliver {
        producer: UserId,
        deal: DealId,
    },
    RejectDelivery {
        producer: UserId,
        deal: DealId,
    },
    Match,
}

impl CsvRecord {
    /// Converts a CSV record to a marketplace event.
    ///
    /// Returns `None` for unknown event names or missing required fields.
    fn into_event(self) -> Option<MarketEvent> {
        let actor = UserId(self.actor);

        match self.event.to_lowercase().as_str() {
            "list" => Some(MarketEvent::List {
                producer: actor,
                product: ProductId(self.product?),
                quantity: self.quantity?,
                unit: self.unit?.parse().ok()?,
                price: self.price,
                region: Region::province(self.region?),
            }),
            "withdraw" => Some(MarketEvent::Withdraw {
                producer: actor,
                listing: ListingId(self.listing?),
            }),
            "interest" => Some(MarketEvent::Interest {
                buyer: actor,
                product: ProductId(self.product?),
                quantity: self.quantity?,
                unit: self.unit?.parse().ok()?,
                ceiling: self.price,
                region: Region::province(self.region?),
            }),
            "decline" => Some(MarketEvent::Decline {
                interest: InterestId(self.interest?),
            }),
            "accept" => Some(MarketEvent::Accept {
                producer: actor,
                interest: InterestId(self.interest?),
                listing: ListingId(self.listing?),
            }),
            "pay" => Some(MarketEvent::Pay {
                buyer: actor,
                deal: DealId(self.deal?),
            }),
            "proof" => Some(MarketEvent::Proof {
                buyer: actor,
                deal: DealId(self.deal?),
                filename: self.file?,
            }),
            "validate" => Some(MarketEvent::Validate {
                deal: DealId(self.deal?),
            }),
            "reject_payment" => Some(MarketEvent::RejectPayment {
                deal: DealId(self.deal?),
            }),
            "deliver" => Some(MarketEvent::Deliver {
                producer: actor,
                deal: DealId(self.deal?),
            }),
            "reject_delivery" => Some(MarketEvent::RejectDelivery {
                producer: actor,
                deal: DealId(self.deal?),
            }),
            "match" => Some(MarketEvent::Match),
            _ => None,
        }
    }
}

fn apply(engine: &Engine, event: MarketEvent) -> Result<(), harvest_market_rs::MarketError> {
    match event {
        MarketEvent::List {
            producer,
            product,
            quantity,
            unit,
            price,
            region,
        } => engine
            .publish_listing(producer, product, quantity, unit, price, region)
            .map(|_| ()),
        MarketEvent::Withdraw { producer, listing } => engine.withdraw_listing(producer, listing),
        MarketEvent::Interest {
            buyer,
            product,
            quantity,
            unit,
            ceiling,
            region,
        } => engine
            .create_interest(buyer, product, quantity, unit, ceiling, region)
            .map(|_| ()),
        MarketEvent::Decline { interest } => engine.decline_interest(interest),
        MarketEvent::Accept {
            producer,
            interest,
            listing,
        } => engine.accept_interest(producer, interest, listing).map(|_| ()),
        MarketEvent::Pay { buyer, deal } => engine.pay_instant(buyer, deal),
        MarketEvent::Proof {
            buyer,
            deal,
            filename,
        } => engine.submit_transfer_proof(
            buyer,
            deal,
            ProofUpload {
                filename,
                bytes: Vec::new(),
            },
        ),
        MarketEvent::Validate { deal } => engine.validate_payment(deal),
        MarketEvent::RejectPayment { deal } => engine.reject_payment(deal, "rejected by admin"),
        MarketEvent::Deliver { producer, deal } => engine.confirm_delivery(producer, deal),
        MarketEvent::RejectDelivery { producer, deal } => engine.reject_delivery(producer, deal),
        MarketEvent::Match => {
            for (interest, listing) in engine.run_matching() {
                tracing::info!(%interest, %listing, "match proposal");
            }
            Ok(())
        }
    }
}

/// Replays marketplace events from a CSV reader into `engine`.
///
/// Streaming parse; malformed rows and failed events are skipped so one bad
/// record never aborts the replay.
///
/// # CSV Format
///
/// Expected columns: `event, actor, product, quantity, unit, price, region,
/// interest, listing, deal, file`
/// - `event`: list, withdraw, interest, decline, accept, pay, proof,
///   validate, reject_payment, deliver, reject_delivery, match
/// - `actor`: Acting user ID (u32)
/// - `unit`: kg, sack or tonne
/// - remaining columns only where the event needs them
///
/// # Example
///
/// ```csv
/// event,actor,product,quantity,unit,price,region,interest,listing,deal,file
/// list,1,7,2,sack,50,Huambo,,,,
/// interest,2,7,80,kg,60,Huambo,,,,
/// accept,1,,,,,,1,1,,
/// pay,2,,,,,,,,1,
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the CSV structure is invalid.
pub fn process_events<R: Read>(engine: &Engine, reader: R) -> Result<(), csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true) // Allow trailing empty fields
        .has_headers(true)
        .from_reader(reader);

    for result in rdr.deserialize::<CsvRecord>() {
        match result {
            Ok(record) => {
                let Some(event) = record.into_event() else {
                    #[cfg(debug_assertions)]
                    eprintln!("Skipping invalid event record");
                    continue;
                };

                // Replay the event, ignoring failures (silent skip)
                if let Err(e) = apply(engine, event) {
                    #[cfg(debug_assertions)]
                    eprintln!("Skipping event: {}", e);
                }
            }
            Err(e) => {
                // Skip malformed rows
                #[cfg(debug_assertions)]
                eprintln!("Skipping malformed row: {}", e);
                continue;
            }
        }
    }

    Ok(())
}

/// Writes the deal book to a CSV writer.
///
/// # CSV Format
///
/// Columns: `id, listing, interest, buyer, quantity_kg, total_price,
/// payment_method, proof, invoice_ref, status, created_at`
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_deals<W: Write>(engine: &Engine, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);

    for deal in engine.deals() {
        wtr.serialize(&deal)?;
    }

    wtr.flush()?;
    Ok(())
}
