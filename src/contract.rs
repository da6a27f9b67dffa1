//! Protobuf messages of the `InstrumentsService` contract.
//!
//! Only the fields read by this crate are declared; prost skips unknown
//! fields on decode, so the server may send a newer revision of a message.

use chrono::{DateTime, Utc};
use prost_types::Timestamp;

pub const INSTRUMENTS_SERVICE: &str = "tinkoff.public.invest.api.contract.v1.InstrumentsService";

const NANOS_PER_UNIT: f64 = 1_000_000_000.0;

/// Fixed-point decimal: `units + nano / 1e9`.
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Quotation {
    #[prost(int64, tag = "1")]
    pub units: i64,
    #[prost(int32, tag = "2")]
    pub nano: i32,
}

impl Quotation {
    pub fn to_f64(&self) -> f64 {
        self.units as f64 + self.nano as f64 / NANOS_PER_UNIT
    }
}

/// Fixed-point amount in `currency`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MoneyValue {
    #[prost(string, tag = "1")]
    pub currency: String,
    #[prost(int64, tag = "2")]
    pub units: i64,
    #[prost(int32, tag = "3")]
    pub nano: i32,
}

impl MoneyValue {
    pub fn to_f64(&self) -> f64 {
        self.units as f64 + self.nano as f64 / NANOS_PER_UNIT
    }
}

/// Converts a protobuf timestamp, falling back to the Unix epoch for
/// out-of-range values.
pub fn timestamp_to_utc(ts: &Timestamp) -> DateTime<Utc> {
    DateTime::from_timestamp(ts.seconds, ts.nanos.max(0) as u32)
        .unwrap_or_default()
}

pub fn utc_to_timestamp(dt: DateTime<Utc>) -> Timestamp {
    Timestamp {
        seconds: dt.timestamp(),
        nanos: dt.timestamp_subsec_nanos() as i32,
    }
}

fn display_timestamp(ts: Option<&Timestamp>) -> String {
    ts.map(|ts| timestamp_to_utc(ts).to_string())
        .unwrap_or_default()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum InstrumentStatus {
    Unspecified = 0,
    /// Instruments available for trading through the API.
    Base = 1,
    All = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum InstrumentIdType {
    Unspecified = 0,
    Figi = 1,
    Ticker = 2,
    Uid = 3,
    PositionUid = 4,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum InstrumentType {
    Unspecified = 0,
    Bond = 1,
    Share = 2,
    Currency = 3,
    Etf = 4,
    Futures = 5,
    Sp = 6,
    Option = 7,
    ClearingCertificate = 8,
    Index = 9,
    Commodity = 10,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FindInstrumentRequest {
    #[prost(string, tag = "1")]
    pub query: String,
    #[prost(enumeration = "InstrumentType", optional, tag = "2")]
    pub instrument_kind: Option<i32>,
    #[prost(bool, optional, tag = "3")]
    pub api_trade_available_flag: Option<bool>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FindInstrumentResponse {
    #[prost(message, repeated, tag = "1")]
    pub instruments: Vec<InstrumentShort>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InstrumentShort {
    #[prost(string, tag = "1")]
    pub isin: String,
    #[prost(string, tag = "2")]
    pub figi: String,
    #[prost(string, tag = "3")]
    pub ticker: String,
    #[prost(string, tag = "4")]
    pub class_code: String,
    #[prost(string, tag = "5")]
    pub instrument_type: String,
    #[prost(string, tag = "6")]
    pub name: String,
    #[prost(string, tag = "7")]
    pub uid: String,
    #[prost(string, tag = "8")]
    pub position_uid: String,
    #[prost(enumeration = "InstrumentType", tag = "10")]
    pub instrument_kind: i32,
    #[prost(bool, tag = "11")]
    pub api_trade_available_flag: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TradingSchedulesRequest {
    #[prost(string, optional, tag = "1")]
    pub exchange: Option<String>,
    #[prost(message, optional, tag = "2")]
    pub from: Option<Timestamp>,
    #[prost(message, optional, tag = "3")]
    pub to: Option<Timestamp>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TradingSchedulesResponse {
    #[prost(message, repeated, tag = "1")]
    pub exchanges: Vec<TradingSchedule>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TradingSchedule {
    #[prost(string, tag = "1")]
    pub exchange: String,
    #[prost(message, repeated, tag = "2")]
    pub days: Vec<TradingDay>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TradingDay {
    #[prost(message, optional, tag = "1")]
    pub date: Option<Timestamp>,
    #[prost(bool, tag = "2")]
    pub is_trading_day: bool,
    #[prost(message, optional, tag = "3")]
    pub start_time: Option<Timestamp>,
    #[prost(message, optional, tag = "4")]
    pub end_time: Option<Timestamp>,
    #[prost(message, optional, tag = "7")]
    pub opening_auction_start_time: Option<Timestamp>,
    #[prost(message, optional, tag = "8")]
    pub closing_auction_end_time: Option<Timestamp>,
}

impl TradingDay {
    /// `date trading|closed start..end`
    pub fn summary(&self) -> String {
        let date = self
            .date
            .as_ref()
            .map(|ts| timestamp_to_utc(ts).date_naive().to_string())
            .unwrap_or_default();
        if !self.is_trading_day {
            return format!("{date} closed");
        }
        format!(
            "{date} trading {}..{}",
            display_timestamp(self.start_time.as_ref()),
            display_timestamp(self.end_time.as_ref())
        )
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InstrumentRequest {
    #[prost(enumeration = "InstrumentIdType", tag = "1")]
    pub id_type: i32,
    #[prost(string, optional, tag = "2")]
    pub class_code: Option<String>,
    #[prost(string, tag = "3")]
    pub id: String,
}

impl InstrumentRequest {
    pub fn by_figi(figi: &str) -> Self {
        Self {
            id_type: InstrumentIdType::Figi as i32,
            class_code: None,
            id: figi.to_string(),
        }
    }

    pub fn by_uid(uid: &str) -> Self {
        Self {
            id_type: InstrumentIdType::Uid as i32,
            class_code: None,
            id: uid.to_string(),
        }
    }

    /// Tickers are only unique within a trading mode, hence the class code.
    pub fn by_ticker(ticker: &str, class_code: &str) -> Self {
        Self {
            id_type: InstrumentIdType::Ticker as i32,
            class_code: Some(class_code.to_string()),
            id: ticker.to_string(),
        }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InstrumentsRequest {
    #[prost(enumeration = "InstrumentStatus", optional, tag = "1")]
    pub instrument_status: Option<i32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ShareResponse {
    #[prost(message, optional, tag = "1")]
    pub instrument: Option<Share>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SharesResponse {
    #[prost(message, repeated, tag = "1")]
    pub instruments: Vec<Share>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Share {
    #[prost(string, tag = "1")]
    pub figi: String,
    #[prost(string, tag = "2")]
    pub ticker: String,
    #[prost(string, tag = "3")]
    pub class_code: String,
    #[prost(string, tag = "4")]
    pub isin: String,
    #[prost(int32, tag = "5")]
    pub lot: i32,
    #[prost(string, tag = "6")]
    pub currency: String,
    #[prost(string, tag = "15")]
    pub name: String,
    #[prost(string, tag = "16")]
    pub exchange: String,
    #[prost(message, optional, tag = "17")]
    pub ipo_date: Option<Timestamp>,
    #[prost(int64, tag = "18")]
    pub issue_size: i64,
    #[prost(string, tag = "19")]
    pub country_of_risk: String,
    #[prost(string, tag = "21")]
    pub sector: String,
    #[prost(message, optional, tag = "23")]
    pub nominal: Option<MoneyValue>,
    #[prost(message, optional, tag = "31")]
    pub min_price_increment: Option<Quotation>,
    #[prost(bool, tag = "32")]
    pub api_trade_available_flag: bool,
    #[prost(string, tag = "33")]
    pub uid: String,
    #[prost(string, tag = "35")]
    pub position_uid: String,
}

impl Share {
    pub fn ipo_date_utc(&self) -> Option<DateTime<Utc>> {
        self.ipo_date.as_ref().map(timestamp_to_utc)
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BondResponse {
    #[prost(message, optional, tag = "1")]
    pub instrument: Option<Bond>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BondsResponse {
    #[prost(message, repeated, tag = "1")]
    pub instruments: Vec<Bond>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Bond {
    #[prost(string, tag = "1")]
    pub figi: String,
    #[prost(string, tag = "2")]
    pub ticker: String,
    #[prost(string, tag = "3")]
    pub class_code: String,
    #[prost(string, tag = "4")]
    pub isin: String,
    #[prost(int32, tag = "5")]
    pub lot: i32,
    #[prost(string, tag = "6")]
    pub currency: String,
    #[prost(string, tag = "15")]
    pub name: String,
    #[prost(string, tag = "16")]
    pub exchange: String,
    #[prost(int32, tag = "17")]
    pub coupon_quantity_per_year: i32,
    #[prost(message, optional, tag = "18")]
    pub maturity_date: Option<Timestamp>,
    #[prost(message, optional, tag = "19")]
    pub nominal: Option<MoneyValue>,
    #[prost(message, optional, tag = "24")]
    pub aci_value: Option<MoneyValue>,
    #[prost(string, tag = "25")]
    pub country_of_risk: String,
    #[prost(string, tag = "27")]
    pub sector: String,
    #[prost(bool, tag = "35")]
    pub floating_coupon_flag: bool,
    #[prost(bool, tag = "36")]
    pub perpetual_flag: bool,
    #[prost(bool, tag = "37")]
    pub amortization_flag: bool,
    #[prost(bool, tag = "39")]
    pub api_trade_available_flag: bool,
    #[prost(string, tag = "40")]
    pub uid: String,
    #[prost(string, tag = "42")]
    pub position_uid: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetAccruedInterestsRequest {
    #[prost(string, tag = "1")]
    pub figi: String,
    #[prost(message, optional, tag = "2")]
    pub from: Option<Timestamp>,
    #[prost(message, optional, tag = "3")]
    pub to: Option<Timestamp>,
    #[prost(string, tag = "4")]
    pub instrument_id: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetAccruedInterestsResponse {
    #[prost(message, repeated, tag = "1")]
    pub accrued_interests: Vec<AccruedInterest>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AccruedInterest {
    #[prost(message, optional, tag = "1")]
    pub date: Option<Timestamp>,
    #[prost(message, optional, tag = "2")]
    pub value: Option<Quotation>,
    #[prost(message, optional, tag = "3")]
    pub value_percent: Option<Quotation>,
    #[prost(message, optional, tag = "4")]
    pub nominal: Option<Quotation>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetBondCouponsRequest {
    #[prost(string, tag = "1")]
    pub figi: String,
    #[prost(message, optional, tag = "2")]
    pub from: Option<Timestamp>,
    #[prost(message, optional, tag = "3")]
    pub to: Option<Timestamp>,
    #[prost(string, tag = "4")]
    pub instrument_id: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetBondCouponsResponse {
    #[prost(message, repeated, tag = "1")]
    pub events: Vec<Coupon>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Coupon {
    #[prost(string, tag = "1")]
    pub figi: String,
    #[prost(message, optional, tag = "2")]
    pub coupon_date: Option<Timestamp>,
    #[prost(int64, tag = "3")]
    pub coupon_number: i64,
    #[prost(message, optional, tag = "4")]
    pub fix_date: Option<Timestamp>,
    #[prost(message, optional, tag = "5")]
    pub pay_one_bond: Option<MoneyValue>,
    #[prost(int32, tag = "9")]
    pub coupon_period: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetDividendsRequest {
    #[prost(string, tag = "1")]
    pub figi: String,
    #[prost(message, optional, tag = "2")]
    pub from: Option<Timestamp>,
    #[prost(message, optional, tag = "3")]
    pub to: Option<Timestamp>,
    #[prost(string, tag = "4")]
    pub instrument_id: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetDividendsResponse {
    #[prost(message, repeated, tag = "1")]
    pub dividends: Vec<Dividend>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Dividend {
    #[prost(message, optional, tag = "1")]
    pub dividend_net: Option<MoneyValue>,
    #[prost(message, optional, tag = "2")]
    pub payment_date: Option<Timestamp>,
    #[prost(message, optional, tag = "3")]
    pub declared_date: Option<Timestamp>,
    #[prost(message, optional, tag = "4")]
    pub last_buy_date: Option<Timestamp>,
    #[prost(string, tag = "5")]
    pub dividend_type: String,
    #[prost(message, optional, tag = "6")]
    pub record_date: Option<Timestamp>,
    #[prost(string, tag = "7")]
    pub regularity: String,
    #[prost(message, optional, tag = "9")]
    pub yield_value: Option<Quotation>,
}
