//! SQLite store for lots, quality controls, packaging and shipments
//!
//! Uses parameterized queries exclusively (no SQL string concatenation).
//! Multi-row writes are transactional.

use chrono::NaiveDate;
use rusqlite::{params, Connection, Row};
use serde::Serialize;

use crate::error::{LotError, Result};
use crate::models::{
    default_remark, is_card_type, is_subsidiary, Courier, DeliveryAgency, Lot, LotType, NewLot,
    QualityControl, Shipment, ShipmentStatus, ShippingReference, TestResult,
};
use crate::packaging::{allocate, vip_pack_count, ShippingUnit, UnitKind};
use crate::sampling::{cards_to_test, SamplingDecision};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Default delivery agency per country, loaded on first start
const DEFAULT_AGENCIES: [(&str, &str); 9] = [
    ("Burkina Faso", "Burkina/Coris"),
    ("Togo", "DHL"),
    ("Sénégal", "DHL"),
    ("Niger", "DHL"),
    ("Guinée Conakry", "DHL"),
    ("Guinée Bissau", "DHL"),
    ("Côte d'Ivoire", "CHRONOPOST"),
    ("Mali", "CHRONOPOST"),
    ("Bénin", "CHRONOPOST"),
];

/// Consignee reference blocks per country, loaded on first start
const DEFAULT_REFERENCES: [(&str, &str); 8] = [
    (
        "Côte d'Ivoire",
        "CORIS BANK INTERNATIONAL COTE D'IVOIRE, Abidjan Treichville Zone 1, \
         Bld VGE Angle Bld Delafosse, 01 BP 4690 Abidjan 01. Tel : +225 27 20 20 94 92",
    ),
    (
        "Guinée Conakry",
        "CORIS BANK INTERNATIONAL GUINEE, Boulevard Diallo, angle av. de la Gare, \
         Kaloum, Almamya, BP 3048 Conakry. Tel : +224 610 00 08 18",
    ),
    (
        "Bénin",
        "CORIS BANK INTERNATIONAL BENIN, Lot 122 Parcelle ZA, Avenue Steinmetz, \
         01 BP 5783 Cotonou. Tel : +229 63 63 08 59",
    ),
    (
        "Guinée Bissau",
        "CORIS BANK INTERNATIONAL BISSAU, Sede Praça dos Herois Nacionais, \
         CP 390-1031 Bissau. Tel : +245 95 56 01 010",
    ),
    (
        "Mali",
        "CORIS BANK INTERNATIONAL MALI, Bamako. Tel : +223 20 70 59 00",
    ),
    (
        "Niger",
        "CORIS BANK INTERNATIONAL NIGER, Bld de la Liberté, Rue NM-2, \
         BP 10377 Niamey. Tel : +227 20 34 04 08",
    ),
    (
        "Sénégal",
        "CORIS BANK INTERNATIONAL SENEGAL, Immeuble Futura, Corniche Ouest des \
         Almadies, BP 14310 Dakar. Tel : +221 33 829 66 93",
    ),
    (
        "Togo",
        "CORIS BANK INTERNATIONAL TOGO, 1258 Bd du 13 Janvier, Béniglato, \
         01 BP 4032 Lomé. Tel : +228 22 20 82 82",
    ),
];

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS lots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            lot_type TEXT NOT NULL,
            quantity INTEGER NOT NULL,
            production_date TEXT NOT NULL,
            registration_date TEXT NOT NULL,
            subsidiary TEXT NOT NULL,
            pin_printing INTEGER NOT NULL,
            pin_count INTEGER NOT NULL,
            cards_to_test INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_lots_registration ON lots(registration_date);
        CREATE INDEX IF NOT EXISTS idx_lots_subsidiary ON lots(subsidiary);

        CREATE TABLE IF NOT EXISTS quality_controls (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            lot_id INTEGER NOT NULL,
            card_type TEXT NOT NULL,
            quantity INTEGER NOT NULL,
            sample_size INTEGER NOT NULL,
            control_date TEXT NOT NULL,
            remark TEXT NOT NULL,
            result TEXT NOT NULL,
            FOREIGN KEY (lot_id) REFERENCES lots(id)
        );

        CREATE INDEX IF NOT EXISTS idx_quality_lot ON quality_controls(lot_id);
        CREATE INDEX IF NOT EXISTS idx_quality_date ON quality_controls(control_date);

        CREATE TABLE IF NOT EXISTS packaging_units (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            lot_id INTEGER NOT NULL,
            lot_type TEXT NOT NULL,
            subsidiary TEXT NOT NULL,
            unit_kind TEXT NOT NULL,
            card_count INTEGER NOT NULL,
            packaging_date TEXT NOT NULL,
            operator TEXT NOT NULL,
            remark TEXT NOT NULL,
            vip_packs INTEGER NOT NULL,
            FOREIGN KEY (lot_id) REFERENCES lots(id)
        );

        CREATE INDEX IF NOT EXISTS idx_packaging_date ON packaging_units(packaging_date);

        CREATE TABLE IF NOT EXISTS delivery_agencies (
            country TEXT PRIMARY KEY,
            agency TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS couriers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            agency TEXT NOT NULL,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            contact TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_couriers_agency ON couriers(agency);

        CREATE TABLE IF NOT EXISTS shipping_references (
            country TEXT PRIMARY KEY,
            reference TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS shipments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            lot_id INTEGER NOT NULL,
            country TEXT NOT NULL,
            status TEXT NOT NULL,
            waybill TEXT NOT NULL,
            reference TEXT NOT NULL,
            agency TEXT NOT NULL,
            courier_id INTEGER NOT NULL,
            shipment_date TEXT NOT NULL,
            FOREIGN KEY (lot_id) REFERENCES lots(id),
            FOREIGN KEY (courier_id) REFERENCES couriers(id)
        );

        CREATE INDEX IF NOT EXISTS idx_shipments_status ON shipments(status);
        ",
    )?;

    log::info!("Database schema initialized");
    Ok(())
}

/// Load the default delivery agencies and shipping references.
///
/// Idempotent: existing rows (possibly edited by operators) are left alone.
pub fn seed_directory(conn: &Connection) -> Result<()> {
    let mut agencies = conn.prepare_cached(
        "INSERT OR IGNORE INTO delivery_agencies (country, agency) VALUES (?1, ?2)",
    )?;
    for (country, agency) in DEFAULT_AGENCIES {
        agencies.execute(params![country, agency])?;
    }

    let mut references = conn.prepare_cached(
        "INSERT OR IGNORE INTO shipping_references (country, reference) VALUES (?1, ?2)",
    )?;
    for (country, reference) in DEFAULT_REFERENCES {
        references.execute(params![country, reference])?;
    }

    log::info!("Directory data seeded");
    Ok(())
}

/// Today's date in the department's timezone.
///
/// Pinned to Africa/Ouagadougou so records are stamped consistently no matter
/// where the server runs.
pub fn today_date() -> NaiveDate {
    use chrono::Utc;
    use chrono_tz::Africa::Ouagadougou;
    Utc::now().with_timezone(&Ouagadougou).date_naive()
}

fn date_to_sql(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn date_from_sql(idx: usize, value: String) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(&value, DATE_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn label_from_sql<T>(
    idx: usize,
    value: String,
    parse: fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    parse(&value).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("unrecognized label: {}", value).into(),
        )
    })
}

// ── Lots ───────────────────────────────────────────────────────────────────

/// Optional filters for lot listings
#[derive(Debug, Default, Clone)]
pub struct LotFilter {
    pub registered_from: Option<NaiveDate>,
    pub registered_to: Option<NaiveDate>,
    pub subsidiary: Option<String>,
    pub lot_type: Option<LotType>,
}

fn lot_from_row(row: &Row<'_>) -> rusqlite::Result<Lot> {
    Ok(Lot {
        id: row.get(0)?,
        name: row.get(1)?,
        lot_type: label_from_sql(2, row.get(2)?, LotType::parse)?,
        quantity: row.get(3)?,
        production_date: date_from_sql(4, row.get(4)?)?,
        registration_date: date_from_sql(5, row.get(5)?)?,
        subsidiary: row.get(6)?,
        pin_printing: row.get(7)?,
        pin_count: row.get(8)?,
        cards_to_test: row.get(9)?,
    })
}

const LOT_COLUMNS: &str = "id, name, lot_type, quantity, production_date, registration_date, \
                           subsidiary, pin_printing, pin_count, cards_to_test";

fn check_new_lot(lot: &NewLot) -> Result<()> {
    if lot.quantity == 0 {
        return Err(LotError::InvalidQuantity(lot.quantity));
    }
    if !is_subsidiary(&lot.subsidiary) {
        return Err(LotError::UnknownCountry(lot.subsidiary.clone()));
    }
    Ok(())
}

/// Register a new lot.
///
/// Lot names are unique across the whole history; the per-lot test figure is
/// stamped at insert time.
pub fn insert_lot(conn: &Connection, lot: &NewLot) -> Result<Lot> {
    check_new_lot(lot)?;

    let existing: i64 = conn.query_row(
        "SELECT COUNT(*) FROM lots WHERE name = ?1",
        params![&lot.name],
        |row| row.get(0),
    )?;
    if existing > 0 {
        return Err(LotError::DuplicateLotName(lot.name.clone()));
    }

    let to_test = cards_to_test(lot.quantity)?;
    let pin_count = if lot.pin_printing { lot.pin_count } else { 0 };

    conn.execute(
        "INSERT INTO lots (name, lot_type, quantity, production_date, registration_date,
                           subsidiary, pin_printing, pin_count, cards_to_test)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            &lot.name,
            lot.lot_type.as_str(),
            lot.quantity,
            date_to_sql(lot.production_date),
            date_to_sql(lot.registration_date),
            &lot.subsidiary,
            lot.pin_printing,
            pin_count,
            to_test,
        ],
    )?;

    let id = conn.last_insert_rowid();
    log::info!("Registered lot '{}' (id {})", lot.name, id);

    get_lot(conn, id)?.ok_or(LotError::LotNotFound(id))
}

/// Fetch a lot by id
pub fn get_lot(conn: &Connection, id: i64) -> Result<Option<Lot>> {
    let mut stmt = conn.prepare_cached(&format!("SELECT {} FROM lots WHERE id = ?1", LOT_COLUMNS))?;
    let mut rows = stmt.query(params![id])?;
    match rows.next()? {
        Some(row) => Ok(Some(lot_from_row(row)?)),
        None => Ok(None),
    }
}

/// List lots, newest registration first, with optional filters
pub fn list_lots(conn: &Connection, filter: &LotFilter) -> Result<Vec<Lot>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM lots
         WHERE (?1 IS NULL OR registration_date >= ?1)
           AND (?2 IS NULL OR registration_date <= ?2)
           AND (?3 IS NULL OR subsidiary = ?3)
           AND (?4 IS NULL OR lot_type = ?4)
         ORDER BY registration_date DESC, id DESC",
        LOT_COLUMNS
    ))?;

    let lots = stmt
        .query_map(
            params![
                filter.registered_from.map(date_to_sql),
                filter.registered_to.map(date_to_sql),
                filter.subsidiary.as_deref(),
                filter.lot_type.map(|t| t.as_str()),
            ],
            lot_from_row,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(lots)
}

/// Replace a lot's fields, recomputing the test figure
pub fn update_lot(conn: &Connection, id: i64, lot: &NewLot) -> Result<Lot> {
    check_new_lot(lot)?;

    if get_lot(conn, id)?.is_none() {
        return Err(LotError::LotNotFound(id));
    }

    let clash: i64 = conn.query_row(
        "SELECT COUNT(*) FROM lots WHERE name = ?1 AND id != ?2",
        params![&lot.name, id],
        |row| row.get(0),
    )?;
    if clash > 0 {
        return Err(LotError::DuplicateLotName(lot.name.clone()));
    }

    let to_test = cards_to_test(lot.quantity)?;
    let pin_count = if lot.pin_printing { lot.pin_count } else { 0 };

    conn.execute(
        "UPDATE lots SET name = ?1, lot_type = ?2, quantity = ?3, production_date = ?4,
                         registration_date = ?5, subsidiary = ?6, pin_printing = ?7,
                         pin_count = ?8, cards_to_test = ?9
         WHERE id = ?10",
        params![
            &lot.name,
            lot.lot_type.as_str(),
            lot.quantity,
            date_to_sql(lot.production_date),
            date_to_sql(lot.registration_date),
            &lot.subsidiary,
            lot.pin_printing,
            pin_count,
            to_test,
            id,
        ],
    )?;

    get_lot(conn, id)?.ok_or(LotError::LotNotFound(id))
}

/// Delete a lot by id
pub fn delete_lot(conn: &Connection, id: i64) -> Result<()> {
    let changed = conn.execute("DELETE FROM lots WHERE id = ?1", params![id])?;
    if changed == 0 {
        return Err(LotError::LotNotFound(id));
    }
    log::info!("Deleted lot {}", id);
    Ok(())
}

/// Lots registered on a given date for a subsidiary, in registration order
pub fn lots_registered_on(
    conn: &Connection,
    date: NaiveDate,
    subsidiary: &str,
) -> Result<Vec<Lot>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM lots WHERE registration_date = ?1 AND subsidiary = ?2 ORDER BY id",
        LOT_COLUMNS
    ))?;
    let lots = stmt
        .query_map(params![date_to_sql(date), subsidiary], lot_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(lots)
}

/// Subsidiaries that registered lots on a given date
pub fn subsidiaries_registered_on(conn: &Connection, date: NaiveDate) -> Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT DISTINCT subsidiary FROM lots WHERE registration_date = ?1 ORDER BY subsidiary",
    )?;
    let names = stmt
        .query_map(params![date_to_sql(date)], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}

// ── Quality control ────────────────────────────────────────────────────────

/// Optional filters for quality-control listings
#[derive(Debug, Default, Clone)]
pub struct QualityFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub lot_id: Option<i64>,
    pub result: Option<TestResult>,
}

/// A quality-control line joined with its lot
#[derive(Debug, Clone, Serialize)]
pub struct QualityRow {
    pub id: i64,
    pub control_date: NaiveDate,
    pub lot_id: i64,
    pub lot_name: String,
    pub subsidiary: String,
    pub card_type: String,
    pub quantity: u32,
    pub sample_size: u32,
    pub result: TestResult,
    pub remark: String,
}

/// Aggregate figures over the recorded controls
#[derive(Debug, Clone, Serialize)]
pub struct QualitySummary {
    pub total_sampled: u32,
    pub passes: u32,
    pub fails: u32,
}

/// Persist a sampling plan as one control line per card type.
///
/// The whole plan is written in a single transaction; a bad card type or a
/// missing lot rejects the entire plan.
pub fn insert_quality_controls(
    conn: &mut Connection,
    lot_id: i64,
    plan: &[SamplingDecision],
    control_date: NaiveDate,
    remark: &str,
    result: TestResult,
) -> Result<Vec<QualityControl>> {
    if get_lot(conn, lot_id)?.is_none() {
        return Err(LotError::LotNotFound(lot_id));
    }
    for decision in plan {
        if !is_card_type(&decision.card_type) {
            return Err(LotError::UnknownCardType(decision.card_type.clone()));
        }
    }

    let remark = if remark.trim().is_empty() {
        default_remark()
    } else {
        remark.to_string()
    };

    let tx = conn.transaction()?;
    let mut inserted = Vec::with_capacity(plan.len());
    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO quality_controls
                 (lot_id, card_type, quantity, sample_size, control_date, remark, result)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for decision in plan {
            stmt.execute(params![
                lot_id,
                &decision.card_type,
                decision.batch_quantity,
                decision.sample_size,
                date_to_sql(control_date),
                &remark,
                result.as_str(),
            ])?;
            inserted.push(QualityControl {
                id: tx.last_insert_rowid(),
                lot_id,
                card_type: decision.card_type.clone(),
                quantity: decision.batch_quantity,
                sample_size: decision.sample_size,
                control_date,
                remark: remark.clone(),
                result,
            });
        }
    }
    tx.commit()?;

    log::info!(
        "Recorded {} quality-control lines for lot {}",
        inserted.len(),
        lot_id
    );
    Ok(inserted)
}

/// List control lines, newest first, with optional filters
pub fn list_quality_controls(conn: &Connection, filter: &QualityFilter) -> Result<Vec<QualityRow>> {
    let mut stmt = conn.prepare_cached(
        "SELECT qc.id, qc.control_date, qc.lot_id, l.name, l.subsidiary, qc.card_type,
                qc.quantity, qc.sample_size, qc.result, qc.remark
         FROM quality_controls qc
         JOIN lots l ON qc.lot_id = l.id
         WHERE (?1 IS NULL OR qc.control_date >= ?1)
           AND (?2 IS NULL OR qc.control_date <= ?2)
           AND (?3 IS NULL OR qc.lot_id = ?3)
           AND (?4 IS NULL OR qc.result = ?4)
         ORDER BY qc.control_date DESC, qc.id DESC",
    )?;

    let rows = stmt
        .query_map(
            params![
                filter.from.map(date_to_sql),
                filter.to.map(date_to_sql),
                filter.lot_id,
                filter.result.map(|r| r.as_str()),
            ],
            |row| {
                Ok(QualityRow {
                    id: row.get(0)?,
                    control_date: date_from_sql(1, row.get(1)?)?,
                    lot_id: row.get(2)?,
                    lot_name: row.get(3)?,
                    subsidiary: row.get(4)?,
                    card_type: row.get(5)?,
                    quantity: row.get(6)?,
                    sample_size: row.get(7)?,
                    result: label_from_sql(8, row.get(8)?, TestResult::parse)?,
                    remark: row.get(9)?,
                })
            },
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Totals across all recorded controls
pub fn quality_summary(conn: &Connection) -> Result<QualitySummary> {
    conn.query_row(
        "SELECT COALESCE(SUM(sample_size), 0),
                COALESCE(SUM(result = ?1), 0),
                COALESCE(SUM(result = ?2), 0)
         FROM quality_controls",
        params![TestResult::Pass.as_str(), TestResult::Fail.as_str()],
        |row| {
            Ok(QualitySummary {
                total_sampled: row.get(0)?,
                passes: row.get(1)?,
                fails: row.get(2)?,
            })
        },
    )
    .map_err(LotError::from)
}

/// Amend a recorded control line
pub fn update_quality_control(
    conn: &Connection,
    id: i64,
    quantity: u32,
    sample_size: u32,
    result: TestResult,
    remark: &str,
) -> Result<()> {
    if quantity == 0 {
        return Err(LotError::InvalidQuantity(quantity));
    }
    let changed = conn.execute(
        "UPDATE quality_controls SET quantity = ?1, sample_size = ?2, result = ?3, remark = ?4
         WHERE id = ?5",
        params![quantity, sample_size, result.as_str(), remark, id],
    )?;
    if changed == 0 {
        return Err(LotError::RecordNotFound("quality_controls", id));
    }
    Ok(())
}

/// Delete a recorded control line
pub fn delete_quality_control(conn: &Connection, id: i64) -> Result<()> {
    let changed = conn.execute("DELETE FROM quality_controls WHERE id = ?1", params![id])?;
    if changed == 0 {
        return Err(LotError::RecordNotFound("quality_controls", id));
    }
    Ok(())
}

// ── Packaging ──────────────────────────────────────────────────────────────

/// Optional filters for packaging listings
#[derive(Debug, Default, Clone)]
pub struct PackagingFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub subsidiary: Option<String>,
    pub lot_type: Option<LotType>,
}

/// One lot-type group processed by a packaging run
#[derive(Debug, Clone, Serialize)]
pub struct PackagingGroup {
    pub lot_type: LotType,
    pub lot_ids: Vec<i64>,
    pub lot_names: Vec<String>,
    pub total_cards: u32,
    pub vip_packs: u32,
    pub units: Vec<ShippingUnit>,
}

/// A persisted shipping unit joined with its lot
#[derive(Debug, Clone, Serialize)]
pub struct PackagingRowEntry {
    pub id: i64,
    pub packaging_date: NaiveDate,
    pub lot_name: String,
    pub subsidiary: String,
    pub lot_type: LotType,
    pub unit_kind: UnitKind,
    pub card_count: u32,
    pub vip_packs: u32,
    pub operator: String,
    pub remark: String,
}

/// Aggregate figures over the persisted units
#[derive(Debug, Clone, Serialize)]
pub struct PackagingSummary {
    pub total_cards: u32,
    pub unit_count: u32,
    pub envelopes: u32,
    pub packets: u32,
}

/// Allocate and persist shipping units for every lot group registered on
/// `date` for `subsidiary`.
///
/// Lots are grouped by lot type; each group's total card count goes through
/// the allocator and every resulting unit is written, tagged with the group's
/// first lot id. VIP packs apply to Ordinary groups only. Returns the
/// processed groups; an empty result means no lots matched.
pub fn run_packaging(
    conn: &mut Connection,
    date: NaiveDate,
    subsidiary: &str,
    operator: &str,
    vip_gold: u32,
    vip_infinite: u32,
    remark: &str,
) -> Result<Vec<PackagingGroup>> {
    if !is_subsidiary(subsidiary) {
        return Err(LotError::UnknownCountry(subsidiary.to_string()));
    }

    let lots = lots_registered_on(conn, date, subsidiary)?;
    if lots.is_empty() {
        log::warn!(
            "No lots registered on {} for {}, nothing to package",
            date,
            subsidiary
        );
        return Ok(Vec::new());
    }

    // Group by lot type, preserving first-seen order
    let mut groups: Vec<PackagingGroup> = Vec::new();
    for lot in &lots {
        match groups.iter_mut().find(|g| g.lot_type == lot.lot_type) {
            Some(group) => {
                group.lot_ids.push(lot.id);
                group.lot_names.push(lot.name.clone());
                group.total_cards += lot.quantity;
            }
            None => groups.push(PackagingGroup {
                lot_type: lot.lot_type,
                lot_ids: vec![lot.id],
                lot_names: vec![lot.name.clone()],
                total_cards: lot.quantity,
                vip_packs: 0,
                units: Vec::new(),
            }),
        }
    }

    for group in &mut groups {
        group.units = allocate(group.total_cards, subsidiary)?;
        group.vip_packs = if group.lot_type == LotType::Ordinary {
            vip_pack_count(vip_gold, vip_infinite)
        } else {
            0
        };
    }

    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO packaging_units
                 (lot_id, lot_type, subsidiary, unit_kind, card_count, packaging_date,
                  operator, remark, vip_packs)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;
        for group in &groups {
            for unit in &group.units {
                stmt.execute(params![
                    group.lot_ids[0],
                    group.lot_type.as_str(),
                    subsidiary,
                    unit.unit_kind.as_str(),
                    unit.card_count,
                    date_to_sql(date),
                    operator,
                    remark,
                    group.vip_packs,
                ])?;
            }
        }
    }
    tx.commit()?;

    let unit_total: usize = groups.iter().map(|g| g.units.len()).sum();
    log::info!(
        "Packaged {} lot group(s) into {} unit(s) for {} ({})",
        groups.len(),
        unit_total,
        subsidiary,
        date
    );
    Ok(groups)
}

/// List persisted units, newest first, with optional filters
pub fn list_packaging(
    conn: &Connection,
    filter: &PackagingFilter,
) -> Result<Vec<PackagingRowEntry>> {
    let mut stmt = conn.prepare_cached(
        "SELECT p.id, p.packaging_date, l.name, p.subsidiary, p.lot_type, p.unit_kind,
                p.card_count, p.vip_packs, p.operator, p.remark
         FROM packaging_units p
         JOIN lots l ON p.lot_id = l.id
         WHERE (?1 IS NULL OR p.packaging_date >= ?1)
           AND (?2 IS NULL OR p.packaging_date <= ?2)
           AND (?3 IS NULL OR p.subsidiary = ?3)
           AND (?4 IS NULL OR p.lot_type = ?4)
         ORDER BY p.packaging_date DESC, p.id DESC",
    )?;

    let rows = stmt
        .query_map(
            params![
                filter.from.map(date_to_sql),
                filter.to.map(date_to_sql),
                filter.subsidiary.as_deref(),
                filter.lot_type.map(|t| t.as_str()),
            ],
            |row| {
                Ok(PackagingRowEntry {
                    id: row.get(0)?,
                    packaging_date: date_from_sql(1, row.get(1)?)?,
                    lot_name: row.get(2)?,
                    subsidiary: row.get(3)?,
                    lot_type: label_from_sql(4, row.get(4)?, LotType::parse)?,
                    unit_kind: label_from_sql(5, row.get(5)?, UnitKind::parse)?,
                    card_count: row.get(6)?,
                    vip_packs: row.get(7)?,
                    operator: row.get(8)?,
                    remark: row.get(9)?,
                })
            },
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Totals across all persisted units
pub fn packaging_summary(conn: &Connection) -> Result<PackagingSummary> {
    conn.query_row(
        "SELECT COALESCE(SUM(card_count), 0),
                COUNT(*),
                COALESCE(SUM(unit_kind = ?1), 0),
                COALESCE(SUM(unit_kind = ?2), 0)
         FROM packaging_units",
        params![UnitKind::Envelope.as_str(), UnitKind::Packet.as_str()],
        |row| {
            Ok(PackagingSummary {
                total_cards: row.get(0)?,
                unit_count: row.get(1)?,
                envelopes: row.get(2)?,
                packets: row.get(3)?,
            })
        },
    )
    .map_err(LotError::from)
}

/// Delete every persisted packaging unit, returning the number removed
pub fn clear_packaging(conn: &Connection) -> Result<usize> {
    let removed = conn.execute("DELETE FROM packaging_units", [])?;
    log::warn!("Cleared {} packaging unit(s)", removed);
    Ok(removed)
}

// ── Delivery directory ─────────────────────────────────────────────────────

/// Create or replace the delivery agency for a country
pub fn upsert_agency(conn: &Connection, country: &str, agency: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO delivery_agencies (country, agency) VALUES (?1, ?2)",
        params![country, agency],
    )?;
    Ok(())
}

/// All agencies, ordered by country
pub fn list_agencies(conn: &Connection) -> Result<Vec<DeliveryAgency>> {
    let mut stmt =
        conn.prepare_cached("SELECT country, agency FROM delivery_agencies ORDER BY country")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(DeliveryAgency {
                country: row.get(0)?,
                agency: row.get(1)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Delete the agency entry for a country
pub fn delete_agency(conn: &Connection, country: &str) -> Result<()> {
    let changed = conn.execute(
        "DELETE FROM delivery_agencies WHERE country = ?1",
        params![country],
    )?;
    if changed == 0 {
        return Err(LotError::UnknownCountry(country.to_string()));
    }
    Ok(())
}

/// Agency serving a country, if one is configured
pub fn agency_for(conn: &Connection, country: &str) -> Result<Option<String>> {
    let mut stmt =
        conn.prepare_cached("SELECT agency FROM delivery_agencies WHERE country = ?1")?;
    let mut rows = stmt.query(params![country])?;
    match rows.next()? {
        Some(row) => Ok(Some(row.get(0)?)),
        None => Ok(None),
    }
}

/// Register a courier for an agency
pub fn insert_courier(
    conn: &Connection,
    agency: &str,
    last_name: &str,
    first_name: &str,
    contact: &str,
) -> Result<Courier> {
    conn.execute(
        "INSERT INTO couriers (agency, last_name, first_name, contact) VALUES (?1, ?2, ?3, ?4)",
        params![agency, last_name, first_name, contact],
    )?;
    Ok(Courier {
        id: conn.last_insert_rowid(),
        agency: agency.to_string(),
        last_name: last_name.to_string(),
        first_name: first_name.to_string(),
        contact: contact.to_string(),
    })
}

fn courier_from_row(row: &Row<'_>) -> rusqlite::Result<Courier> {
    Ok(Courier {
        id: row.get(0)?,
        agency: row.get(1)?,
        last_name: row.get(2)?,
        first_name: row.get(3)?,
        contact: row.get(4)?,
    })
}

/// All couriers, ordered by agency then name
pub fn list_couriers(conn: &Connection) -> Result<Vec<Courier>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, agency, last_name, first_name, contact FROM couriers
         ORDER BY agency, last_name, first_name",
    )?;
    let rows = stmt
        .query_map([], courier_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Couriers working for one agency
pub fn couriers_for_agency(conn: &Connection, agency: &str) -> Result<Vec<Courier>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, agency, last_name, first_name, contact FROM couriers
         WHERE agency = ?1 ORDER BY last_name, first_name",
    )?;
    let rows = stmt
        .query_map(params![agency], courier_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Amend a courier's details
pub fn update_courier(
    conn: &Connection,
    id: i64,
    agency: &str,
    last_name: &str,
    first_name: &str,
    contact: &str,
) -> Result<()> {
    let changed = conn.execute(
        "UPDATE couriers SET agency = ?1, last_name = ?2, first_name = ?3, contact = ?4
         WHERE id = ?5",
        params![agency, last_name, first_name, contact, id],
    )?;
    if changed == 0 {
        return Err(LotError::RecordNotFound("couriers", id));
    }
    Ok(())
}

/// Delete a courier
pub fn delete_courier(conn: &Connection, id: i64) -> Result<()> {
    let changed = conn.execute("DELETE FROM couriers WHERE id = ?1", params![id])?;
    if changed == 0 {
        return Err(LotError::RecordNotFound("couriers", id));
    }
    Ok(())
}

/// All configured consignee references, ordered by country
pub fn list_references(conn: &Connection) -> Result<Vec<ShippingReference>> {
    let mut stmt = conn
        .prepare_cached("SELECT country, reference FROM shipping_references ORDER BY country")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(ShippingReference {
                country: row.get(0)?,
                reference: row.get(1)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Consignee reference block for a country, if one is configured
pub fn shipping_reference_for(conn: &Connection, country: &str) -> Result<Option<String>> {
    let mut stmt =
        conn.prepare_cached("SELECT reference FROM shipping_references WHERE country = ?1")?;
    let mut rows = stmt.query(params![country])?;
    match rows.next()? {
        Some(row) => Ok(Some(row.get(0)?)),
        None => Ok(None),
    }
}

// ── Shipments ──────────────────────────────────────────────────────────────

/// A shipment joined with its lot and courier
#[derive(Debug, Clone, Serialize)]
pub struct ShipmentRow {
    pub id: i64,
    pub lot_id: i64,
    pub lot_name: String,
    pub country: String,
    pub status: ShipmentStatus,
    pub waybill: String,
    pub reference: String,
    pub agency: String,
    pub courier_name: String,
    pub shipment_date: NaiveDate,
}

/// Shipment counts by status
#[derive(Debug, Clone, Serialize)]
pub struct ShipmentSummary {
    pub pending: u32,
    pub in_transit: u32,
    pub shipped: u32,
}

/// Record a shipment for a lot to a destination country.
///
/// The consignee reference and delivery agency are resolved from the
/// country's directory entries. When no courier is given, the agency's first
/// registered courier is assigned; an agency with no couriers cannot ship.
pub fn create_shipment(
    conn: &Connection,
    lot_id: i64,
    country: &str,
    status: ShipmentStatus,
    waybill: &str,
    courier_id: Option<i64>,
    shipment_date: NaiveDate,
) -> Result<Shipment> {
    if !is_subsidiary(country) {
        return Err(LotError::UnknownCountry(country.to_string()));
    }
    if get_lot(conn, lot_id)?.is_none() {
        return Err(LotError::LotNotFound(lot_id));
    }

    let reference = shipping_reference_for(conn, country)?
        .unwrap_or_else(|| "Référence non disponible".to_string());
    let agency =
        agency_for(conn, country)?.unwrap_or_else(|| "Agence non définie".to_string());

    let courier_id = match courier_id {
        Some(id) => {
            let known: i64 = conn.query_row(
                "SELECT COUNT(*) FROM couriers WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )?;
            if known == 0 {
                return Err(LotError::RecordNotFound("couriers", id));
            }
            id
        }
        None => couriers_for_agency(conn, &agency)?
            .first()
            .map(|c| c.id)
            .ok_or_else(|| LotError::NoCourierForAgency(agency.clone()))?,
    };

    conn.execute(
        "INSERT INTO shipments
             (lot_id, country, status, waybill, reference, agency, courier_id, shipment_date)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            lot_id,
            country,
            status.as_str(),
            waybill,
            reference,
            agency,
            courier_id,
            date_to_sql(shipment_date),
        ],
    )?;

    let id = conn.last_insert_rowid();
    log::info!("Recorded shipment {} for lot {} to {}", id, lot_id, country);
    Ok(Shipment {
        id,
        lot_id,
        country: country.to_string(),
        status,
        waybill: waybill.to_string(),
        reference,
        agency,
        courier_id,
        shipment_date,
    })
}

/// List shipments, newest first
pub fn list_shipments(conn: &Connection) -> Result<Vec<ShipmentRow>> {
    let mut stmt = conn.prepare_cached(
        "SELECT s.id, s.lot_id, l.name, s.country, s.status, s.waybill, s.reference,
                s.agency, COALESCE(c.last_name || ' ' || c.first_name, ''), s.shipment_date
         FROM shipments s
         JOIN lots l ON s.lot_id = l.id
         LEFT JOIN couriers c ON s.courier_id = c.id
         ORDER BY s.shipment_date DESC, s.id DESC",
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok(ShipmentRow {
                id: row.get(0)?,
                lot_id: row.get(1)?,
                lot_name: row.get(2)?,
                country: row.get(3)?,
                status: label_from_sql(4, row.get(4)?, ShipmentStatus::parse)?,
                waybill: row.get(5)?,
                reference: row.get(6)?,
                agency: row.get(7)?,
                courier_name: row.get(8)?,
                shipment_date: date_from_sql(9, row.get(9)?)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Move a shipment to a new status
pub fn update_shipment_status(conn: &Connection, id: i64, status: ShipmentStatus) -> Result<()> {
    let changed = conn.execute(
        "UPDATE shipments SET status = ?1 WHERE id = ?2",
        params![status.as_str(), id],
    )?;
    if changed == 0 {
        return Err(LotError::RecordNotFound("shipments", id));
    }
    Ok(())
}

/// Delete a shipment
pub fn delete_shipment(conn: &Connection, id: i64) -> Result<()> {
    let changed = conn.execute("DELETE FROM shipments WHERE id = ?1", params![id])?;
    if changed == 0 {
        return Err(LotError::RecordNotFound("shipments", id));
    }
    Ok(())
}

/// Shipment counts by status
pub fn shipment_status_counts(conn: &Connection) -> Result<ShipmentSummary> {
    conn.query_row(
        "SELECT COALESCE(SUM(status = ?1), 0),
                COALESCE(SUM(status = ?2), 0),
                COALESCE(SUM(status = ?3), 0)
         FROM shipments",
        params![
            ShipmentStatus::Pending.as_str(),
            ShipmentStatus::InTransit.as_str(),
            ShipmentStatus::Shipped.as_str(),
        ],
        |row| {
            Ok(ShipmentSummary {
                pending: row.get(0)?,
                in_transit: row.get(1)?,
                shipped: row.get(2)?,
            })
        },
    )
    .map_err(LotError::from)
}

/// Shipment counts per delivery agency, busiest first
pub fn shipments_by_agency(conn: &Connection) -> Result<Vec<(String, u32)>> {
    let mut stmt = conn.prepare_cached(
        "SELECT agency, COUNT(*) FROM shipments GROUP BY agency ORDER BY COUNT(*) DESC, agency",
    )?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::plan_samples;

    /// Create an in-memory database for testing
    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        seed_directory(&conn).unwrap();
        conn
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn sample_lot(name: &str, subsidiary: &str, quantity: u32) -> NewLot {
        NewLot {
            name: name.to_string(),
            lot_type: LotType::Ordinary,
            quantity,
            production_date: date("2026-03-01"),
            registration_date: date("2026-03-02"),
            subsidiary: subsidiary.to_string(),
            pin_printing: true,
            pin_count: quantity,
        }
    }

    #[test]
    fn init_schema_creates_tables() {
        let conn = test_db();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN
                 ('lots', 'quality_controls', 'packaging_units', 'delivery_agencies',
                  'couriers', 'shipping_references', 'shipments')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 7);
    }

    #[test]
    fn seed_is_idempotent_and_preserves_edits() {
        let conn = test_db();
        assert_eq!(list_agencies(&conn).unwrap().len(), 9);

        upsert_agency(&conn, "Togo", "UPS").unwrap();
        seed_directory(&conn).unwrap();

        assert_eq!(agency_for(&conn, "Togo").unwrap().as_deref(), Some("UPS"));
        assert_eq!(list_agencies(&conn).unwrap().len(), 9);
    }

    #[test]
    fn insert_lot_stamps_cards_to_test() {
        let conn = test_db();
        let lot = insert_lot(&conn, &sample_lot("LOT-001", "Mali", 2600)).unwrap();

        assert_eq!(lot.cards_to_test, 52);
        assert_eq!(lot.quantity, 2600);
        assert_eq!(lot.subsidiary, "Mali");
    }

    #[test]
    fn insert_lot_rejects_duplicate_name() {
        let conn = test_db();
        insert_lot(&conn, &sample_lot("LOT-001", "Mali", 100)).unwrap();

        let err = insert_lot(&conn, &sample_lot("LOT-001", "Togo", 200));
        assert!(matches!(err, Err(LotError::DuplicateLotName(_))));
    }

    #[test]
    fn insert_lot_rejects_bad_inputs() {
        let conn = test_db();
        assert!(matches!(
            insert_lot(&conn, &sample_lot("LOT-002", "Mali", 0)),
            Err(LotError::InvalidQuantity(0))
        ));
        assert!(matches!(
            insert_lot(&conn, &sample_lot("LOT-003", "France", 10)),
            Err(LotError::UnknownCountry(_))
        ));
    }

    #[test]
    fn pin_count_is_zeroed_without_pin_printing() {
        let conn = test_db();
        let mut new_lot = sample_lot("LOT-PIN", "Niger", 80);
        new_lot.pin_printing = false;
        new_lot.pin_count = 80;

        let lot = insert_lot(&conn, &new_lot).unwrap();
        assert_eq!(lot.pin_count, 0);
    }

    #[test]
    fn list_lots_applies_filters() {
        let conn = test_db();
        insert_lot(&conn, &sample_lot("A", "Mali", 100)).unwrap();
        let mut other = sample_lot("B", "Togo", 200);
        other.registration_date = date("2026-03-10");
        other.lot_type = LotType::Renewal;
        insert_lot(&conn, &other).unwrap();

        let all = list_lots(&conn, &LotFilter::default()).unwrap();
        assert_eq!(all.len(), 2);

        let mali_only = list_lots(
            &conn,
            &LotFilter {
                subsidiary: Some("Mali".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(mali_only.len(), 1);
        assert_eq!(mali_only[0].name, "A");

        let late = list_lots(
            &conn,
            &LotFilter {
                registered_from: Some(date("2026-03-05")),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(late.len(), 1);
        assert_eq!(late[0].name, "B");

        let renewals = list_lots(
            &conn,
            &LotFilter {
                lot_type: Some(LotType::Renewal),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(renewals.len(), 1);
    }

    #[test]
    fn update_lot_recomputes_cards_to_test() {
        let conn = test_db();
        let lot = insert_lot(&conn, &sample_lot("LOT-001", "Mali", 100)).unwrap();
        assert_eq!(lot.cards_to_test, 2);

        let mut revised = sample_lot("LOT-001", "Mali", 251);
        revised.pin_printing = false;
        let updated = update_lot(&conn, lot.id, &revised).unwrap();
        assert_eq!(updated.cards_to_test, 6);
        assert_eq!(updated.pin_count, 0);
    }

    #[test]
    fn update_lot_rejects_name_clash() {
        let conn = test_db();
        insert_lot(&conn, &sample_lot("A", "Mali", 100)).unwrap();
        let b = insert_lot(&conn, &sample_lot("B", "Mali", 100)).unwrap();

        let err = update_lot(&conn, b.id, &sample_lot("A", "Mali", 100));
        assert!(matches!(err, Err(LotError::DuplicateLotName(_))));
    }

    #[test]
    fn delete_missing_lot_errors() {
        let conn = test_db();
        assert!(matches!(
            delete_lot(&conn, 999),
            Err(LotError::LotNotFound(999))
        ));
    }

    #[test]
    fn quality_plan_round_trip_and_summary() {
        let mut conn = test_db();
        let lot = insert_lot(&conn, &sample_lot("LOT-001", "Mali", 300)).unwrap();

        let plan = plan_samples(&[
            ("open".to_string(), 120),
            ("challenge".to_string(), 40),
        ])
        .unwrap();
        let lines = insert_quality_controls(
            &mut conn,
            lot.id,
            &plan,
            date("2026-03-03"),
            "",
            TestResult::Pass,
        )
        .unwrap();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].remark, "RAS");

        let rows = list_quality_controls(&conn, &QualityFilter::default()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].lot_name, "LOT-001");

        let summary = quality_summary(&conn).unwrap();
        assert_eq!(summary.total_sampled, 4); // 3 (>100) + 1 (≤50)
        assert_eq!(summary.passes, 2);
        assert_eq!(summary.fails, 0);
    }

    #[test]
    fn quality_plan_rejects_unknown_card_type() {
        let mut conn = test_db();
        let lot = insert_lot(&conn, &sample_lot("LOT-001", "Mali", 300)).unwrap();

        let plan = vec![SamplingDecision {
            card_type: "mastercard".to_string(),
            batch_quantity: 10,
            sample_size: 1,
        }];
        let err = insert_quality_controls(
            &mut conn,
            lot.id,
            &plan,
            date("2026-03-03"),
            "RAS",
            TestResult::Pass,
        );
        assert!(matches!(err, Err(LotError::UnknownCardType(_))));

        // Nothing persisted
        let rows = list_quality_controls(&conn, &QualityFilter::default()).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn quality_line_can_be_amended() {
        let mut conn = test_db();
        let lot = insert_lot(&conn, &sample_lot("LOT-001", "Mali", 300)).unwrap();
        let plan = plan_samples(&[("open".to_string(), 60)]).unwrap();
        let lines = insert_quality_controls(
            &mut conn,
            lot.id,
            &plan,
            date("2026-03-03"),
            "RAS",
            TestResult::Pass,
        )
        .unwrap();

        update_quality_control(&conn, lines[0].id, 80, 2, TestResult::Fail, "encoche abîmée")
            .unwrap();

        let rows = list_quality_controls(&conn, &QualityFilter::default()).unwrap();
        assert_eq!(rows[0].quantity, 80);
        assert_eq!(rows[0].sample_size, 2);
        assert_eq!(rows[0].result, TestResult::Fail);
        assert_eq!(rows[0].remark, "encoche abîmée");

        assert!(matches!(
            update_quality_control(&conn, 999, 10, 1, TestResult::Pass, ""),
            Err(LotError::RecordNotFound("quality_controls", 999))
        ));
        assert!(matches!(
            update_quality_control(&conn, lines[0].id, 0, 1, TestResult::Pass, ""),
            Err(LotError::InvalidQuantity(0))
        ));
    }

    #[test]
    fn quality_filters_by_result() {
        let mut conn = test_db();
        let lot = insert_lot(&conn, &sample_lot("LOT-001", "Mali", 300)).unwrap();
        let plan = plan_samples(&[("open".to_string(), 60)]).unwrap();
        insert_quality_controls(
            &mut conn,
            lot.id,
            &plan,
            date("2026-03-03"),
            "RAS",
            TestResult::Fail,
        )
        .unwrap();

        let fails = list_quality_controls(
            &conn,
            &QualityFilter {
                result: Some(TestResult::Fail),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(fails.len(), 1);

        let passes = list_quality_controls(
            &conn,
            &QualityFilter {
                result: Some(TestResult::Pass),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(passes.is_empty());
    }

    #[test]
    fn packaging_run_persists_every_group() {
        let mut conn = test_db();
        let reg = date("2026-03-02");

        // Two Ordinary lots and one Renewal lot, same day, same subsidiary
        insert_lot(&conn, &sample_lot("A", "Sénégal", 300)).unwrap();
        insert_lot(&conn, &sample_lot("B", "Sénégal", 200)).unwrap();
        let mut renewal = sample_lot("C", "Sénégal", 100);
        renewal.lot_type = LotType::Renewal;
        insert_lot(&conn, &renewal).unwrap();

        let groups = run_packaging(&mut conn, reg, "Sénégal", "dupont", 2, 1, "").unwrap();
        assert_eq!(groups.len(), 2);

        // Ordinary group: 500 cards at capacity 249 → 249 + 249 + 2
        let ordinary = &groups[0];
        assert_eq!(ordinary.lot_type, LotType::Ordinary);
        assert_eq!(ordinary.total_cards, 500);
        assert_eq!(ordinary.vip_packs, 3);
        assert_eq!(ordinary.units.len(), 3);
        assert_eq!(ordinary.units[2].unit_kind, UnitKind::Envelope);
        assert_eq!(ordinary.units[2].card_count, 2);

        // Renewal group: 100 cards → one envelope, no VIP packs
        let renewal_group = &groups[1];
        assert_eq!(renewal_group.vip_packs, 0);
        assert_eq!(renewal_group.units.len(), 1);
        assert_eq!(renewal_group.units[0].unit_kind, UnitKind::Envelope);

        // All four units persisted
        let rows = list_packaging(&conn, &PackagingFilter::default()).unwrap();
        assert_eq!(rows.len(), 4);

        let summary = packaging_summary(&conn).unwrap();
        assert_eq!(summary.total_cards, 600);
        assert_eq!(summary.unit_count, 4);
        assert_eq!(summary.envelopes, 2);
        assert_eq!(summary.packets, 2);
    }

    #[test]
    fn packaging_run_with_no_lots_is_empty() {
        let mut conn = test_db();
        let groups =
            run_packaging(&mut conn, date("2026-01-01"), "Mali", "dupont", 0, 0, "").unwrap();
        assert!(groups.is_empty());
        assert_eq!(packaging_summary(&conn).unwrap().unit_count, 0);
    }

    #[test]
    fn clear_packaging_removes_everything() {
        let mut conn = test_db();
        insert_lot(&conn, &sample_lot("A", "Mali", 700)).unwrap();
        run_packaging(&mut conn, date("2026-03-02"), "Mali", "dupont", 0, 0, "").unwrap();

        let removed = clear_packaging(&conn).unwrap();
        assert!(removed > 0);
        assert_eq!(packaging_summary(&conn).unwrap().unit_count, 0);
    }

    #[test]
    fn shipment_resolves_directory_entries() {
        let conn = test_db();
        let lot = insert_lot(&conn, &sample_lot("LOT-001", "Togo", 100)).unwrap();
        insert_courier(&conn, "DHL", "Sika", "Benjamin", "+228 93 00 00 00").unwrap();

        let shipment = create_shipment(
            &conn,
            lot.id,
            "Togo",
            ShipmentStatus::Pending,
            "BD-2026-001",
            None,
            date("2026-03-05"),
        )
        .unwrap();
        assert_eq!(shipment.agency, "DHL");

        let shipments = list_shipments(&conn).unwrap();
        assert_eq!(shipments.len(), 1);
        let row = &shipments[0];
        assert_eq!(row.id, shipment.id);
        assert_eq!(row.agency, "DHL");
        assert!(row.reference.contains("TOGO"));
        assert_eq!(row.courier_name, "Sika Benjamin");
        assert_eq!(row.status, ShipmentStatus::Pending);
    }

    #[test]
    fn shipment_requires_a_courier() {
        let conn = test_db();
        let lot = insert_lot(&conn, &sample_lot("LOT-001", "Togo", 100)).unwrap();

        let err = create_shipment(
            &conn,
            lot.id,
            "Togo",
            ShipmentStatus::Pending,
            "BD-2026-001",
            None,
            date("2026-03-05"),
        );
        assert!(matches!(err, Err(LotError::NoCourierForAgency(_))));
    }

    #[test]
    fn shipment_rejects_unknown_country_and_lot() {
        let conn = test_db();
        let lot = insert_lot(&conn, &sample_lot("LOT-001", "Togo", 100)).unwrap();

        assert!(matches!(
            create_shipment(
                &conn,
                lot.id,
                "France",
                ShipmentStatus::Pending,
                "BD",
                None,
                date("2026-03-05"),
            ),
            Err(LotError::UnknownCountry(_))
        ));
        assert!(matches!(
            create_shipment(
                &conn,
                999,
                "Togo",
                ShipmentStatus::Pending,
                "BD",
                None,
                date("2026-03-05"),
            ),
            Err(LotError::LotNotFound(999))
        ));
    }

    #[test]
    fn shipment_status_lifecycle_and_counts() {
        let conn = test_db();
        let lot = insert_lot(&conn, &sample_lot("LOT-001", "Mali", 100)).unwrap();
        insert_courier(&conn, "CHRONOPOST", "Diarra", "Oumar", "+223 70 00 00 00").unwrap();

        let first = create_shipment(
            &conn,
            lot.id,
            "Mali",
            ShipmentStatus::Pending,
            "BD-1",
            None,
            date("2026-03-05"),
        )
        .unwrap();
        create_shipment(
            &conn,
            lot.id,
            "Mali",
            ShipmentStatus::Pending,
            "BD-2",
            None,
            date("2026-03-06"),
        )
        .unwrap();

        update_shipment_status(&conn, first.id, ShipmentStatus::Shipped).unwrap();

        let summary = shipment_status_counts(&conn).unwrap();
        assert_eq!(summary.pending, 1);
        assert_eq!(summary.in_transit, 0);
        assert_eq!(summary.shipped, 1);

        let by_agency = shipments_by_agency(&conn).unwrap();
        assert_eq!(by_agency, vec![("CHRONOPOST".to_string(), 2)]);
    }

    #[test]
    fn courier_directory_round_trip() {
        let conn = test_db();
        let courier = insert_courier(&conn, "DHL", "Ngom", "Béatrice", "+221 78 00 00 00").unwrap();

        assert_eq!(couriers_for_agency(&conn, "DHL").unwrap().len(), 1);
        assert!(couriers_for_agency(&conn, "CHRONOPOST").unwrap().is_empty());

        update_courier(&conn, courier.id, "CHRONOPOST", "Ngom", "Béatrice", "+221").unwrap();
        assert_eq!(couriers_for_agency(&conn, "CHRONOPOST").unwrap().len(), 1);

        delete_courier(&conn, courier.id).unwrap();
        assert!(list_couriers(&conn).unwrap().is_empty());
        assert!(matches!(
            delete_courier(&conn, courier.id),
            Err(LotError::RecordNotFound("couriers", _))
        ));
    }

    #[test]
    fn shipping_reference_lookup() {
        let conn = test_db();
        let reference = shipping_reference_for(&conn, "Sénégal").unwrap().unwrap();
        assert!(reference.contains("SENEGAL"));
        assert!(shipping_reference_for(&conn, "Burkina Faso")
            .unwrap()
            .is_none());
    }
}
