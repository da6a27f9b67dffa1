use chrono::{DateTime, Utc};
use tracing::debug;

use crate::client::{ServiceChannel, ServiceError};
use crate::contract::{
    BondResponse, BondsResponse, FindInstrumentRequest, FindInstrumentResponse,
    GetAccruedInterestsRequest, GetAccruedInterestsResponse, GetBondCouponsRequest,
    GetBondCouponsResponse, GetDividendsRequest, GetDividendsResponse, InstrumentRequest,
    InstrumentStatus, InstrumentsRequest, ShareResponse, SharesResponse,
    TradingSchedulesRequest, TradingSchedulesResponse, utc_to_timestamp,
};

const FIND_INSTRUMENT: &str =
    "/tinkoff.public.invest.api.contract.v1.InstrumentsService/FindInstrument";
const TRADING_SCHEDULES: &str =
    "/tinkoff.public.invest.api.contract.v1.InstrumentsService/TradingSchedules";
const SHARE_BY: &str = "/tinkoff.public.invest.api.contract.v1.InstrumentsService/ShareBy";
const SHARES: &str = "/tinkoff.public.invest.api.contract.v1.InstrumentsService/Shares";
const BOND_BY: &str = "/tinkoff.public.invest.api.contract.v1.InstrumentsService/BondBy";
const BONDS: &str = "/tinkoff.public.invest.api.contract.v1.InstrumentsService/Bonds";
const GET_ACCRUED_INTERESTS: &str =
    "/tinkoff.public.invest.api.contract.v1.InstrumentsService/GetAccruedInterests";
const GET_BOND_COUPONS: &str =
    "/tinkoff.public.invest.api.contract.v1.InstrumentsService/GetBondCoupons";
const GET_DIVIDENDS: &str =
    "/tinkoff.public.invest.api.contract.v1.InstrumentsService/GetDividends";

/// The instrument queries the example runner issues.
///
/// Implemented by [`InstrumentsServiceClient`]; tests substitute an
/// in-memory implementation.
#[allow(async_fn_in_trait)]
pub trait InstrumentsApi {
    async fn find_instrument(&self, query: &str) -> Result<FindInstrumentResponse, ServiceError>;

    async fn trading_schedules(
        &self,
        exchange: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<TradingSchedulesResponse, ServiceError>;

    async fn share_by_uid(&self, uid: &str) -> Result<ShareResponse, ServiceError>;

    async fn bonds(&self, status: InstrumentStatus) -> Result<BondsResponse, ServiceError>;

    async fn bond_by_figi(&self, figi: &str) -> Result<BondResponse, ServiceError>;

    async fn get_accrued_interests(
        &self,
        instrument_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<GetAccruedInterestsResponse, ServiceError>;

    async fn get_bond_coupons(
        &self,
        instrument_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<GetBondCouponsResponse, ServiceError>;

    async fn get_dividends(
        &self,
        instrument_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<GetDividendsResponse, ServiceError>;
}

/// Read-only facade over `InstrumentsService`. Obtained from
/// [`Client::instruments`](crate::client::Client::instruments).
#[derive(Clone)]
pub struct InstrumentsServiceClient {
    channel: ServiceChannel,
}

impl InstrumentsServiceClient {
    pub(crate) fn new(channel: ServiceChannel) -> Self {
        Self { channel }
    }

    /// Full-text search over tickers, names, ISINs and FIGIs.
    pub async fn find_instrument(
        &self,
        query: &str,
    ) -> Result<FindInstrumentResponse, ServiceError> {
        debug!("find instrument {query:?}");
        self.channel
            .unary(
                FIND_INSTRUMENT,
                FindInstrumentRequest {
                    query: query.to_string(),
                    ..Default::default()
                },
            )
            .await
    }

    pub async fn trading_schedules(
        &self,
        exchange: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<TradingSchedulesResponse, ServiceError> {
        self.channel
            .unary(
                TRADING_SCHEDULES,
                TradingSchedulesRequest {
                    exchange: Some(exchange.to_string()),
                    from: Some(utc_to_timestamp(from)),
                    to: Some(utc_to_timestamp(to)),
                },
            )
            .await
    }

    pub async fn share_by_uid(&self, uid: &str) -> Result<ShareResponse, ServiceError> {
        self.channel
            .unary(SHARE_BY, InstrumentRequest::by_uid(uid))
            .await
    }

    pub async fn share_by_figi(&self, figi: &str) -> Result<ShareResponse, ServiceError> {
        self.channel
            .unary(SHARE_BY, InstrumentRequest::by_figi(figi))
            .await
    }

    pub async fn share_by_ticker(
        &self,
        ticker: &str,
        class_code: &str,
    ) -> Result<ShareResponse, ServiceError> {
        self.channel
            .unary(SHARE_BY, InstrumentRequest::by_ticker(ticker, class_code))
            .await
    }

    pub async fn shares(&self, status: InstrumentStatus) -> Result<SharesResponse, ServiceError> {
        self.channel.unary(SHARES, status_request(status)).await
    }

    pub async fn bond_by_uid(&self, uid: &str) -> Result<BondResponse, ServiceError> {
        self.channel
            .unary(BOND_BY, InstrumentRequest::by_uid(uid))
            .await
    }

    pub async fn bond_by_figi(&self, figi: &str) -> Result<BondResponse, ServiceError> {
        self.channel
            .unary(BOND_BY, InstrumentRequest::by_figi(figi))
            .await
    }

    pub async fn bond_by_ticker(
        &self,
        ticker: &str,
        class_code: &str,
    ) -> Result<BondResponse, ServiceError> {
        self.channel
            .unary(BOND_BY, InstrumentRequest::by_ticker(ticker, class_code))
            .await
    }

    pub async fn bonds(&self, status: InstrumentStatus) -> Result<BondsResponse, ServiceError> {
        self.channel.unary(BONDS, status_request(status)).await
    }

    /// `instrument_id` accepts either a FIGI or an instrument uid.
    pub async fn get_accrued_interests(
        &self,
        instrument_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<GetAccruedInterestsResponse, ServiceError> {
        self.channel
            .unary(
                GET_ACCRUED_INTERESTS,
                GetAccruedInterestsRequest {
                    from: Some(utc_to_timestamp(from)),
                    to: Some(utc_to_timestamp(to)),
                    instrument_id: instrument_id.to_string(),
                    ..Default::default()
                },
            )
            .await
    }

    pub async fn get_bond_coupons(
        &self,
        instrument_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<GetBondCouponsResponse, ServiceError> {
        self.channel
            .unary(
                GET_BOND_COUPONS,
                GetBondCouponsRequest {
                    from: Some(utc_to_timestamp(from)),
                    to: Some(utc_to_timestamp(to)),
                    instrument_id: instrument_id.to_string(),
                    ..Default::default()
                },
            )
            .await
    }

    pub async fn get_dividends(
        &self,
        instrument_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<GetDividendsResponse, ServiceError> {
        self.channel
            .unary(
                GET_DIVIDENDS,
                GetDividendsRequest {
                    from: Some(utc_to_timestamp(from)),
                    to: Some(utc_to_timestamp(to)),
                    instrument_id: instrument_id.to_string(),
                    ..Default::default()
                },
            )
            .await
    }
}

fn status_request(status: InstrumentStatus) -> InstrumentsRequest {
    InstrumentsRequest {
        instrument_status: Some(status as i32),
    }
}

impl InstrumentsApi for InstrumentsServiceClient {
    async fn find_instrument(&self, query: &str) -> Result<FindInstrumentResponse, ServiceError> {
        InstrumentsServiceClient::find_instrument(self, query).await
    }

    async fn trading_schedules(
        &self,
        exchange: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<TradingSchedulesResponse, ServiceError> {
        InstrumentsServiceClient::trading_schedules(self, exchange, from, to)
            .await
    }

    async fn share_by_uid(&self, uid: &str) -> Result<ShareResponse, ServiceError> {
        InstrumentsServiceClient::share_by_uid(self, uid).await
    }

    async fn bonds(&self, status: InstrumentStatus) -> Result<BondsResponse, ServiceError> {
        InstrumentsServiceClient::bonds(self, status).await
    }

    async fn bond_by_figi(&self, figi: &str) -> Result<BondResponse, ServiceError> {
        InstrumentsServiceClient::bond_by_figi(self, figi).await
    }

    async fn get_accrued_interests(
        &self,
        instrument_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<GetAccruedInterestsResponse, ServiceError> {
        InstrumentsServiceClient::get_accrued_interests(self, instrument_id, from, to)
            .await
    }

    async fn get_bond_coupons(
        &self,
        instrument_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<GetBondCouponsResponse, ServiceError> {
        InstrumentsServiceClient::get_bond_coupons(self, instrument_id, from, to)
            .await
    }

    async fn get_dividends(
        &self,
        instrument_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<GetDividendsResponse, ServiceError> {
        InstrumentsServiceClient::get_dividends(self, instrument_id, from, to)
            .await
    }
}
