//! Location-based endpoints.

use common::Envelope;

use crate::client::ApiClient;
use crate::models::{DeliveryZoneCheck, NearbySeller, Product};
use crate::query::Query;

/// Geo method group.
pub struct GeoApi<'a> {
    client: &'a ApiClient,
}

impl<'a> GeoApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    /// List sellers within `radius_km` of the given point, nearest first.
    pub async fn nearby_sellers(
        &self,
        lat: f64,
        lng: f64,
        radius_km: f64,
        limit: Option<u32>,
    ) -> Envelope<Vec<NearbySeller>> {
        let query = Query::new()
            .set("lat", lat)
            .set("lng", lng)
            .set("radiusKm", radius_km)
            .set_opt("limit", limit);
        self.client.get("/geo/sellers", query).await
    }

    /// List products sold within `radius_km` of the given point.
    pub async fn nearby_products(
        &self,
        lat: f64,
        lng: f64,
        radius_km: f64,
        limit: Option<u32>,
    ) -> Envelope<Vec<Product>> {
        let query = Query::new()
            .set("lat", lat)
            .set("lng", lng)
            .set("radiusKm", radius_km)
            .set_opt("limit", limit);
        self.client.get("/geo/products", query).await
    }

    /// Check whether a seller delivers to the given point.
    pub async fn check_delivery(
        &self,
        seller_id: &str,
        lat: f64,
        lng: f64,
    ) -> Envelope<DeliveryZoneCheck> {
        let query = Query::new().set("lat", lat).set("lng", lng);
        self.client
            .get(&format!("/geo/delivery/{seller_id}"), query)
            .await
    }
}
