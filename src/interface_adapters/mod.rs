// Interface adapters: backend REST client, wire DTOs and session storage.

pub mod clients;
pub mod protocol;
pub mod storage;
