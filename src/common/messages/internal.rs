use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WireMessage {
    #[serde(rename = "y")]
    pub kind: String,

    #[serde(rename = "c")]
    pub cookie: u32,

    #[serde(rename = "o")]
    pub origin: ByteBuf,

    #[serde(default)]
    #[serde(rename = "k", skip_serializing_if = "Option::is_none")]
    pub key: Option<ByteBuf>,

    #[serde(default)]
    #[serde(rename = "v", skip_serializing_if = "Option::is_none")]
    pub value: Option<ByteBuf>,

    #[serde(default)]
    #[serde(rename = "n", skip_serializing_if = "Option::is_none")]
    // Compact contact infos, see [super::contact_to_bytes].
    pub nodes: Option<Vec<ByteBuf>>,
}

impl WireMessage {
    pub fn from_bytes(bytes: &[u8]) -> Result<WireMessage, serde_bencode::Error> {
        let obj = serde_bencode::from_bytes(bytes)?;
        Ok(obj)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_bencode::Error> {
        serde_bencode::to_bytes(self)
    }
}
