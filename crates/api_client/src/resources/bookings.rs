//! Service booking endpoints.

use common::Envelope;
use serde_json::json;

use crate::client::ApiClient;
use crate::models::{AvailabilitySlot, Booking, BookingRole, BookingStatus, NewBooking};
use crate::query::Query;

/// Filters and pagination for booking listings.
#[derive(Debug, Clone, Default)]
pub struct BookingListParams {
    /// Which side of the booking to list for the authenticated user.
    pub role: Option<BookingRole>,
    pub status: Option<BookingStatus>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl BookingListParams {
    fn to_query(&self) -> Query {
        Query::new()
            .set_opt("role", self.role)
            .set_opt("status", self.status)
            .set_opt("page", self.page)
            .set_opt("limit", self.limit)
    }
}

/// Booking method group.
pub struct BookingsApi<'a> {
    client: &'a ApiClient,
}

impl<'a> BookingsApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    /// List the authenticated user's bookings.
    pub async fn list(&self, params: &BookingListParams) -> Envelope<Vec<Booking>> {
        self.client.get("/bookings", params.to_query()).await
    }

    /// Fetch a single booking.
    pub async fn get(&self, booking_id: &str) -> Envelope<Booking> {
        self.client
            .get(&format!("/bookings/{booking_id}"), Query::new())
            .await
    }

    /// Create a booking for a service.
    pub async fn create(&self, booking: &NewBooking) -> Envelope<Booking> {
        self.client.post("/bookings", json!(booking)).await
    }

    /// Move a booking to a new status (seller confirms/declines, either
    /// side completes).
    pub async fn update_status(
        &self,
        booking_id: &str,
        status: BookingStatus,
    ) -> Envelope<Booking> {
        self.client
            .patch(
                &format!("/bookings/{booking_id}"),
                json!({ "status": status }),
            )
            .await
    }

    /// Cancel a booking.
    pub async fn cancel(&self, booking_id: &str) -> Envelope<Booking> {
        self.client
            .post(&format!("/bookings/{booking_id}/cancel"), json!({}))
            .await
    }

    /// List bookable slots for a service, optionally for one day
    /// (`YYYY-MM-DD`).
    pub async fn availability(
        &self,
        service_id: &str,
        date: Option<&str>,
    ) -> Envelope<Vec<AvailabilitySlot>> {
        let query = Query::new().set_opt("date", date);
        self.client
            .get(&format!("/services/{service_id}/availability"), query)
            .await
    }
}
