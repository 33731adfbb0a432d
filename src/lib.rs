/*!
# Rekap SO

Backend and client workflow for stock-count reconciliation ("rekap") against a
Google spreadsheet.

## Overview

An operator submits a stock count for a date and shift. The backend loads the
master item sheet, resolves each item's unit cost (HPP), computes stock and
variance per item, and appends the resulting rows to the output sheets. Items
without a known cost are reported back so the operator can supply them; supplied
costs are written back to the master sheet.

## Architecture

### Backend
- **Spreadsheet client** - authenticated read/append/update of sheet ranges
- **Token provider** - service-account JWT exchange for bearer tokens
- **Item repository** - typed access to master items and rekap output
- **Reconciliation engine** - cost resolution, counts and record generation
- **Router** - the `/api/...` endpoints plus static asset hosting

### Client
- **Controller** - pure state transitions emitting render instructions
- **API client** - HTTP calls to the backend
- **Storage** - local cache used as an offline fallback

## Sheets

- `MS` - master items (`PLU`, `DESCP`, `C1`, `TAG`, `HPP`)
- `RekapSo` - stock rekap rows, with a submission timestamp
- `RekapRekonsiliasi` - reconciliation rows

## REST API Endpoints

- `POST /api/rekap` - submit a rekap
- `GET /api/sheets?sheetName=&range=` - raw sheet values
- `GET /api/check-hpp` - items whose cost is still zero
- `GET /api/health` - liveness and version
*/

pub mod app;
pub mod client;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod logging;
pub mod model;
pub mod repository;
pub mod sheets;
pub mod storage;
pub mod token;

pub use error::{RekapError, RekapResult};

/// Crate version, reported by `/api/health` unless `APP_VERSION` overrides it
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
