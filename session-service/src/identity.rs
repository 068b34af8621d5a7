// Copyright (C) 2026 StarHuntingGames
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use elias_common::UserId;

use crate::error::SessionError;

/// Turns a connection token into a verified player identity.
pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<UserId, SessionError>;
}

/// Accepts a bare decimal user id. Signature checks happen upstream, in
/// the gateway that issued the token.
#[derive(Debug, Default, Clone, Copy)]
pub struct TrustedUserIdVerifier;

impl IdentityVerifier for TrustedUserIdVerifier {
    fn verify(&self, token: &str) -> Result<UserId, SessionError> {
        match token.trim().parse::<UserId>() {
            Ok(user_id) if user_id > 0 => Ok(user_id),
            _ => Err(SessionError::Unauthorized(
                "missing or invalid identity token".to_string(),
            )),
        }
    }
}
