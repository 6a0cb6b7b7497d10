//! Room directory

use super::dto::{DirectRoomRequest, RoomSummary};
use super::{api_error, describe, ApiClient};
use crate::error::{ChatError, ChatResult};

impl ApiClient {
    /// Rooms the current user is a member of, newest first
    pub async fn list_rooms(&self) -> ChatResult<Vec<RoomSummary>> {
        let request = self.authorized(self.client.get(self.url("/chat/rooms/")))?;

        let response = request
            .send()
            .await
            .map_err(|e| ChatError::Request(describe(&e)))?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| ChatError::Request(describe(&e)))
    }

    /// Get or create the direct-message room shared with `recipient_id`
    pub async fn open_direct_room(&self, recipient_id: u64) -> ChatResult<RoomSummary> {
        let request = self.authorized(
            self.client
                .post(self.url("/chat/rooms/"))
                .json(&DirectRoomRequest { recipient_id }),
        )?;

        let response = request
            .send()
            .await
            .map_err(|e| ChatError::Request(describe(&e)))?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let room: RoomSummary = response
            .json()
            .await
            .map_err(|e| ChatError::Request(describe(&e)))?;

        tracing::info!(room = %room.id, identifier = %room.room_identifier, "Direct room ready");
        Ok(room)
    }
}
