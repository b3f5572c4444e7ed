//! EV2 secure messaging channel to an NTAG 424 DNA
//!
//! After `AuthenticateEV2First` every command runs in one of three modes:
//!
//! - Plain: no protection
//! - MAC: `MACt(SesAuthMAC, Ins || CmdCtr || TI || Header || Data)` appended
//! - Full: Data encrypted under SesAuthENC (IV derived from TI and CmdCtr), then MACed
//!
//! The command counter advances after every successful command. An error status
//! from the card ends the session.

use std::fmt;

use boltcard_apdu_core::prelude::*;
use rand::RngCore;
use tracing::{debug, trace, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::commands::native::{NativeStatus, ins, native_command};
use crate::crypto::{
    AesKey, AesProvider, BLOCK_SIZE, Block, SoftAes, pad_m2, rotate_left, truncate_mac, unpad_m2,
};
use crate::error::{CardError, CryptoError, Result};
use crate::file::CommunicationMode;
use crate::types::KeySlot;

const ZERO_IV: Block = [0u8; BLOCK_SIZE];
const MAC_LEN: usize = 8;
const TI_LEN: usize = 4;

const SV1_PREFIX: [u8; 6] = [0xA5, 0x5A, 0x00, 0x01, 0x00, 0x80];
const SV2_PREFIX: [u8; 6] = [0x5A, 0xA5, 0x00, 0x01, 0x00, 0x80];
const CMD_IV_PREFIX: [u8; 2] = [0xA5, 0x5A];
const RESP_IV_PREFIX: [u8; 2] = [0x5A, 0xA5];

/// Default plaintext bytes per ReadData / WriteData exchange
pub const DEFAULT_CHUNK_SIZE: usize = 128;

/// Keys and counters of an authenticated session
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub(crate) struct Session {
    ti: [u8; TI_LEN],
    enc_key: AesKey,
    mac_key: AesKey,
    cmd_counter: u16,
    key_no: u8,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("ti", &hex::encode(self.ti))
            .field("cmd_counter", &self.cmd_counter)
            .field("key_no", &self.key_no)
            .finish_non_exhaustive()
    }
}

impl Session {
    fn iv(&self, aes: &impl AesProvider, prefix: [u8; 2], counter: u16) -> Result<Block> {
        let mut input = [0u8; BLOCK_SIZE];
        input[..2].copy_from_slice(&prefix);
        input[2..6].copy_from_slice(&self.ti);
        input[6..8].copy_from_slice(&counter.to_le_bytes());

        let encrypted = aes.ecb_encrypt(&self.enc_key, &input)?;
        encrypted
            .as_slice()
            .try_into()
            .map_err(|_| CardError::InvalidResponse("IV block"))
    }

    fn command_mac(
        &self,
        aes: &impl AesProvider,
        ins: u8,
        header: &[u8],
        data: &[u8],
    ) -> Result<[u8; MAC_LEN]> {
        let mut input = Vec::with_capacity(1 + 2 + TI_LEN + header.len() + data.len());
        input.push(ins);
        input.extend_from_slice(&self.cmd_counter.to_le_bytes());
        input.extend_from_slice(&self.ti);
        input.extend_from_slice(header);
        input.extend_from_slice(data);
        Ok(truncate_mac(&aes.cmac(&self.mac_key, &input)?))
    }

    fn response_mac(&self, aes: &impl AesProvider, data: &[u8]) -> Result<[u8; MAC_LEN]> {
        let mut input = Vec::with_capacity(1 + 2 + TI_LEN + data.len());
        input.push(0x00);
        input.extend_from_slice(&self.cmd_counter.wrapping_add(1).to_le_bytes());
        input.extend_from_slice(&self.ti);
        input.extend_from_slice(data);
        Ok(truncate_mac(&aes.cmac(&self.mac_key, &input)?))
    }
}

/// Derive `(SesAuthENCKey, SesAuthMACKey)` from the authentication randoms
pub(crate) fn derive_session_keys(
    aes: &impl AesProvider,
    key: &AesKey,
    rnd_a: &[u8; 16],
    rnd_b: &[u8; 16],
) -> std::result::Result<(AesKey, AesKey), CryptoError> {
    let mut context = [0u8; 26];
    context[..2].copy_from_slice(&rnd_a[..2]);
    for i in 0..6 {
        context[2 + i] = rnd_a[2 + i] ^ rnd_b[i];
    }
    context[8..18].copy_from_slice(&rnd_b[6..16]);
    context[18..26].copy_from_slice(&rnd_a[8..16]);

    let mut sv1 = SV1_PREFIX.to_vec();
    sv1.extend_from_slice(&context);
    let mut sv2 = SV2_PREFIX.to_vec();
    sv2.extend_from_slice(&context);

    let enc = AesKey::new(aes.cmac(key, &sv1)?);
    let mac = AesKey::new(aes.cmac(key, &sv2)?);
    sv1.zeroize();
    sv2.zeroize();
    context.zeroize();
    Ok((enc, mac))
}

/// Authenticated command channel over a [`CardTransport`]
pub struct DnaCommunicator<T: CardTransport, A: AesProvider = SoftAes> {
    transport: T,
    aes: A,
    session: Option<Session>,
    read_chunk: usize,
    write_chunk: usize,
}

impl<T: CardTransport, A: AesProvider> fmt::Debug for DnaCommunicator<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DnaCommunicator")
            .field("transport", &self.transport)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl<T: CardTransport> DnaCommunicator<T> {
    /// Wrap a transport using the software AES implementation
    pub const fn new(transport: T) -> Self {
        Self::with_aes(transport, SoftAes)
    }
}

impl<T: CardTransport, A: AesProvider> DnaCommunicator<T, A> {
    /// Wrap a transport with a specific AES capability
    pub const fn with_aes(transport: T, aes: A) -> Self {
        Self {
            transport,
            aes,
            session: None,
            read_chunk: DEFAULT_CHUNK_SIZE,
            write_chunk: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Limit the plaintext size of each ReadData / WriteData exchange
    pub fn with_chunk_sizes(mut self, read_chunk: usize, write_chunk: usize) -> Self {
        self.read_chunk = read_chunk.clamp(1, 240);
        self.write_chunk = write_chunk.clamp(1, 224);
        self
    }

    /// The underlying transport
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutable access to the underlying transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// The AES capability
    pub const fn aes(&self) -> &A {
        &self.aes
    }

    /// Unwrap into the transport
    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Whether an EV2 session is active
    pub const fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    /// Key slot of the active session
    pub fn authenticated_slot(&self) -> Option<KeySlot> {
        self.session
            .as_ref()
            .and_then(|session| KeySlot::from_u8(session.key_no))
    }

    pub(crate) const fn read_chunk(&self) -> usize {
        self.read_chunk
    }

    pub(crate) const fn write_chunk(&self) -> usize {
        self.write_chunk
    }

    /// Forget the active session
    pub fn end_session(&mut self) {
        self.session = None;
    }

    /// Send one command and split the answer into payload and native status
    pub(crate) fn transceive(&mut self, command: &Command) -> Result<(Bytes, NativeStatus)> {
        let raw = self.transport.transmit_raw(&command.to_bytes())?;
        let response = Response::from_bytes(&raw)?;
        let status = NativeStatus::from_status(response.status())
            .ok_or(boltcard_apdu_core::Error::Status(response.status()))?;
        Ok((response.payload().clone(), status))
    }

    /// Send an unwrapped ISO command, requiring `90 00`
    pub(crate) fn transceive_iso(&mut self, command: &Command) -> Result<Bytes> {
        let raw = self.transport.transmit_raw(&command.to_bytes())?;
        Ok(Response::from_bytes(&raw)?.into_payload()?)
    }

    fn fail(&mut self, status: NativeStatus) -> CardError {
        if self.session.take().is_some() {
            debug!(%status, "Card error ended the session");
        }
        CardError::Status(status)
    }

    /// AuthenticateEV2First with the key in `slot`
    pub fn authenticate(&mut self, slot: KeySlot, key: &AesKey) -> Result<()> {
        self.session = None;

        let (payload, status) = self.transceive(&native_command(
            ins::AUTHENTICATE_EV2_FIRST,
            vec![slot.number(), 0x00],
        ))?;
        if status != NativeStatus::AdditionalFrame {
            return Err(CardError::Status(status));
        }
        if payload.len() != BLOCK_SIZE {
            return Err(CardError::InvalidResponse("RndB length"));
        }

        let rnd_b: [u8; 16] = self
            .aes
            .cbc_decrypt(key, &ZERO_IV, &payload)?
            .as_slice()
            .try_into()
            .map_err(|_| CardError::InvalidResponse("RndB length"))?;

        let mut rnd_a = [0u8; 16];
        rand::rng().fill_bytes(&mut rnd_a);

        let mut challenge = rnd_a.to_vec();
        challenge.extend_from_slice(&rotate_left(&rnd_b));
        let encrypted = self.aes.cbc_encrypt(key, &ZERO_IV, &challenge)?;
        challenge.zeroize();

        let (payload, status) = self.transceive(&native_command(ins::ADDITIONAL_FRAME, encrypted))?;
        if status != NativeStatus::Ok {
            return Err(CardError::Status(status));
        }
        if payload.len() != 2 * BLOCK_SIZE {
            return Err(CardError::InvalidResponse("authentication answer length"));
        }

        let mut answer = self.aes.cbc_decrypt(key, &ZERO_IV, &payload)?;
        if answer[TI_LEN..TI_LEN + 16] != rotate_left(&rnd_a) {
            answer.zeroize();
            return Err(CardError::InvalidResponse("RndA mismatch"));
        }
        let mut ti = [0u8; TI_LEN];
        ti.copy_from_slice(&answer[..TI_LEN]);
        answer.zeroize();

        let (enc_key, mac_key) = derive_session_keys(&self.aes, key, &rnd_a, &rnd_b)?;
        rnd_a.zeroize();

        debug!(%slot, ti = %hex::encode(ti), "Authenticated");
        self.session = Some(Session {
            ti,
            enc_key,
            mac_key,
            cmd_counter: 0,
            key_no: slot.number(),
        });
        Ok(())
    }

    /// Build the protected command payload for `mode`
    fn protect(
        &self,
        ins: u8,
        header: &[u8],
        data: &[u8],
        mode: CommunicationMode,
    ) -> Result<Vec<u8>> {
        let mut payload = header.to_vec();
        match (mode, &self.session) {
            (CommunicationMode::Plain, _) => payload.extend_from_slice(data),
            (_, None) => return Err(CardError::NotAuthenticated),
            (CommunicationMode::Mac, Some(session)) => {
                payload.extend_from_slice(data);
                let mac = session.command_mac(&self.aes, ins, header, data)?;
                payload.extend_from_slice(&mac);
            }
            (CommunicationMode::Full, Some(session)) => {
                let encrypted = if data.is_empty() {
                    Vec::new()
                } else {
                    let iv = session.iv(&self.aes, CMD_IV_PREFIX, session.cmd_counter)?;
                    let mut plain = data.to_vec();
                    pad_m2(&mut plain);
                    let encrypted = self.aes.cbc_encrypt(&session.enc_key, &iv, &plain)?;
                    plain.zeroize();
                    encrypted
                };
                let mac = session.command_mac(&self.aes, ins, header, &encrypted)?;
                payload.extend_from_slice(&encrypted);
                payload.extend_from_slice(&mac);
            }
        }
        Ok(payload)
    }

    /// Check and strip the response protection for `mode`
    fn unprotect(&self, response: &[u8], mode: CommunicationMode) -> Result<Bytes> {
        let session = match (mode, &self.session) {
            (CommunicationMode::Plain, _) => return Ok(Bytes::copy_from_slice(response)),
            (_, None) => return Err(CardError::NotAuthenticated),
            (_, Some(session)) => session,
        };

        let Some(split) = response.len().checked_sub(MAC_LEN) else {
            return Err(CardError::InvalidResponse("missing response MAC"));
        };
        let (body, mac) = response.split_at(split);
        if session.response_mac(&self.aes, body)? != mac {
            warn!("Response MAC verification failed");
            return Err(CardError::ResponseMacMismatch);
        }

        if mode == CommunicationMode::Mac || body.is_empty() {
            return Ok(Bytes::copy_from_slice(body));
        }

        let iv = session.iv(
            &self.aes,
            RESP_IV_PREFIX,
            session.cmd_counter.wrapping_add(1),
        )?;
        let mut plain = self.aes.cbc_decrypt(&session.enc_key, &iv, body)?;
        let data = Bytes::copy_from_slice(unpad_m2(&plain)?);
        plain.zeroize();
        Ok(data)
    }

    fn advance_counter(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.cmd_counter = session.cmd_counter.wrapping_add(1);
        }
    }

    /// Run one native command in `mode` and return the unprotected response data
    pub fn send(
        &mut self,
        ins: u8,
        header: &[u8],
        data: &[u8],
        mode: CommunicationMode,
    ) -> Result<Bytes> {
        let payload = self.protect(ins, header, data, mode)?;
        trace!(ins = format_args!("{ins:02X}"), %mode, "Sending native command");

        let (response, status) = self.transceive(&native_command(ins, payload))?;
        if status != NativeStatus::Ok {
            return Err(self.fail(status));
        }

        let data = self.unprotect(&response, mode)?;
        self.advance_counter();
        Ok(data)
    }

    /// Run a Full-mode command whose answer carries no MAC and which ends the session
    pub(crate) fn send_final(&mut self, ins: u8, header: &[u8], data: &[u8]) -> Result<()> {
        let payload = self.protect(ins, header, data, CommunicationMode::Full)?;
        let (_, status) = self.transceive(&native_command(ins, payload))?;
        let outcome = if status == NativeStatus::Ok {
            Ok(())
        } else {
            Err(CardError::Status(status))
        };
        self.session = None;
        outcome
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use boltcard_apdu_core::TransportError;
    use hex_literal::hex;

    use super::*;

    fn frame(parts: &[&[u8]]) -> Bytes {
        parts.concat().into()
    }

    #[test]
    fn test_session_keys_an12196_vector() {
        let key = AesKey::factory();
        let rnd_a = hex!("13C5DB8A5930439FC3DEF9A4C675360F");
        let rnd_b = hex!("B9E2FC789B64BF237CCCAA20EC7E6E48");

        let (enc, mac) = derive_session_keys(&SoftAes, &key, &rnd_a, &rnd_b).unwrap();
        assert_eq!(enc.as_bytes(), &hex!("1309C877509E5A215007FF0ED19CA564"));
        assert_eq!(mac.as_bytes(), &hex!("4C6626F5E72EA694202139295C7A7FC7"));
    }

    /// Card side of the EV2 protocol, enough to exercise every communication mode
    #[derive(Debug)]
    pub(crate) struct EmulatedDna {
        key: AesKey,
        rnd_b: [u8; 16],
        ti: [u8; 4],
        session: Option<Session>,
        pub(crate) connected: bool,
        pub(crate) uid: [u8; 7],
        pub(crate) key_version: u8,
        pub(crate) written: Vec<u8>,
        pub(crate) last_plain_command: Vec<u8>,
    }

    impl EmulatedDna {
        pub(crate) fn new(key: AesKey) -> Self {
            Self {
                key,
                rnd_b: hex!("B9E2FC789B64BF237CCCAA20EC7E6E48"),
                ti: hex!("9D00C4DF"),
                session: None,
                connected: false,
                uid: hex!("04DE5F1EACC040"),
                key_version: 0,
                written: Vec::new(),
                last_plain_command: Vec::new(),
            }
        }

        fn status(sw2: u8) -> Bytes {
            Bytes::copy_from_slice(&[0x91, sw2])
        }

        fn reply(&mut self, body: &[u8]) -> Bytes {
            let session = self.session.as_mut().unwrap();
            let mac = session.response_mac(&SoftAes, body).unwrap();
            session.cmd_counter += 1;
            frame(&[body, &mac, &[0x91, 0x00]])
        }

        fn reply_encrypted(&mut self, plain: &[u8]) -> Bytes {
            let session = self.session.as_ref().unwrap();
            let iv = session
                .iv(&SoftAes, RESP_IV_PREFIX, session.cmd_counter + 1)
                .unwrap();
            let mut padded = plain.to_vec();
            pad_m2(&mut padded);
            let body = SoftAes.cbc_encrypt(&session.enc_key, &iv, &padded).unwrap();
            self.reply(&body)
        }

        /// Verify the command MAC and decrypt Full-mode data
        fn open(&self, ins: u8, header_len: usize, payload: &[u8], full: bool) -> Option<Vec<u8>> {
            let session = self.session.as_ref()?;
            let (header, rest) = payload.split_at(header_len);
            let (body, mac) = rest.split_at(rest.len() - MAC_LEN);
            if session.command_mac(&SoftAes, ins, header, body).ok()? != mac {
                return None;
            }
            if !full || body.is_empty() {
                return Some(body.to_vec());
            }
            let iv = session
                .iv(&SoftAes, CMD_IV_PREFIX, session.cmd_counter)
                .ok()?;
            let plain = SoftAes.cbc_decrypt(&session.enc_key, &iv, body).ok()?;
            unpad_m2(&plain).ok().map(<[u8]>::to_vec)
        }
    }

    impl CardTransport for EmulatedDna {
        fn connect(&mut self) -> std::result::Result<(), TransportError> {
            self.connected = true;
            Ok(())
        }

        fn do_transmit_raw(&mut self, command: &[u8]) -> std::result::Result<Bytes, TransportError> {
            let command = Command::from_bytes(command).map_err(|_| TransportError::Transmission)?;
            let data = command.data_or_empty().to_vec();

            let response = match command.instruction() {
                ins::AUTHENTICATE_EV2_FIRST => {
                    let e_rnd_b = SoftAes.cbc_encrypt(&self.key, &ZERO_IV, &self.rnd_b).unwrap();
                    frame(&[&e_rnd_b, &[0x91, 0xAF]])
                }
                ins::ADDITIONAL_FRAME => {
                    let plain = SoftAes.cbc_decrypt(&self.key, &ZERO_IV, &data).unwrap();
                    if plain[16..] != rotate_left(&self.rnd_b) {
                        return Ok(Self::status(0xAE));
                    }
                    let rnd_a: [u8; 16] = plain[..16].try_into().unwrap();
                    let (enc_key, mac_key) =
                        derive_session_keys(&SoftAes, &self.key, &rnd_a, &self.rnd_b).unwrap();

                    let mut answer = self.ti.to_vec();
                    answer.extend_from_slice(&rotate_left(&rnd_a));
                    answer.resize(32, 0);
                    let encrypted = SoftAes.cbc_encrypt(&self.key, &ZERO_IV, &answer).unwrap();

                    self.session = Some(Session {
                        ti: self.ti,
                        enc_key,
                        mac_key,
                        cmd_counter: 0,
                        key_no: 0,
                    });
                    frame(&[&encrypted, &[0x91, 0x00]])
                }
                ins::GET_KEY_VERSION => match self.open(ins::GET_KEY_VERSION, 1, &data, false) {
                    Some(_) => self.reply(&[self.key_version]),
                    None => Self::status(0x1E),
                },
                ins::GET_CARD_UID => match self.open(ins::GET_CARD_UID, 0, &data, true) {
                    Some(_) => {
                        let uid = self.uid;
                        self.reply_encrypted(&uid)
                    }
                    None => Self::status(0x1E),
                },
                ins::WRITE_DATA => match self.open(ins::WRITE_DATA, 7, &data, true) {
                    Some(plain) => {
                        self.written.extend_from_slice(&plain);
                        self.reply(&[])
                    }
                    None => Self::status(0x1E),
                },
                ins::READ_DATA => {
                    let offset = u32::from_le_bytes([data[1], data[2], data[3], 0]) as usize;
                    let length = u32::from_le_bytes([data[4], data[5], data[6], 0]) as usize;
                    let end = (offset + length).min(self.written.len());
                    if let Some(session) = self.session.as_mut() {
                        session.cmd_counter += 1;
                    }
                    frame(&[&self.written[offset.min(end)..end], &[0x91, 0x00]])
                }
                0xA4 => Bytes::from_static(&[0x90, 0x00]),
                ins::CHANGE_KEY => match self.open(ins::CHANGE_KEY, 1, &data, true) {
                    Some(plain) => {
                        self.last_plain_command = plain;
                        if data[0] == 0 {
                            self.session = None;
                            Self::status(0x00)
                        } else {
                            self.reply(&[])
                        }
                    }
                    None => Self::status(0x1E),
                },
                _ => {
                    self.session = None;
                    Self::status(0x1C)
                }
            };
            Ok(response)
        }

        fn disconnect(&mut self) {
            self.connected = false;
        }

        fn is_connected(&self) -> bool {
            self.connected
        }
    }

    fn authenticated() -> DnaCommunicator<EmulatedDna> {
        let mut transport = EmulatedDna::new(AesKey::factory());
        transport.connect().unwrap();
        let mut dna = DnaCommunicator::new(transport);
        dna.authenticate(KeySlot::Key0, &AesKey::factory()).unwrap();
        dna
    }

    #[test]
    fn test_authenticate() {
        let dna = authenticated();
        assert!(dna.is_authenticated());
        assert_eq!(dna.authenticated_slot(), Some(KeySlot::Key0));
    }

    #[test]
    fn test_authenticate_wrong_key() {
        let mut transport = EmulatedDna::new(AesKey::new([0x11; 16]));
        transport.connect().unwrap();
        let mut dna = DnaCommunicator::new(transport);

        let err = dna
            .authenticate(KeySlot::Key0, &AesKey::factory())
            .unwrap_err();
        assert!(matches!(
            err,
            CardError::Status(NativeStatus::AuthenticationError)
        ));
        assert!(!dna.is_authenticated());
    }

    #[test]
    fn test_mac_and_full_modes_advance_counter() {
        let mut dna = authenticated();

        let version = dna
            .send(ins::GET_KEY_VERSION, &[0x01], &[], CommunicationMode::Mac)
            .unwrap();
        assert_eq!(version.as_ref(), [0x00]);

        let uid = dna
            .send(ins::GET_CARD_UID, &[], &[], CommunicationMode::Full)
            .unwrap();
        assert_eq!(uid.as_ref(), hex!("04DE5F1EACC040"));

        let header = [0x02, 0x00, 0x00, 0x00, 0x03, 0x00, 0x00];
        dna.send(ins::WRITE_DATA, &header, b"abc", CommunicationMode::Full)
            .unwrap();
        assert_eq!(dna.transport().written, b"abc");
    }

    #[test]
    fn test_secure_command_requires_session() {
        let mut transport = EmulatedDna::new(AesKey::factory());
        transport.connect().unwrap();
        let mut dna = DnaCommunicator::new(transport);

        let err = dna
            .send(ins::GET_CARD_UID, &[], &[], CommunicationMode::Full)
            .unwrap_err();
        assert!(matches!(err, CardError::NotAuthenticated));
    }

    #[test]
    fn test_error_status_ends_session() {
        let mut dna = authenticated();
        let err = dna
            .send(0x6A, &[], &[], CommunicationMode::Mac)
            .unwrap_err();
        assert!(matches!(
            err,
            CardError::Status(NativeStatus::IllegalCommand)
        ));
        assert!(!dna.is_authenticated());
    }

    #[test]
    fn test_send_final_ends_session() {
        let mut dna = authenticated();
        let mut data = [0x22; 16].to_vec();
        data.push(0x01);
        dna.send_final(ins::CHANGE_KEY, &[0x00], &data).unwrap();
        assert!(!dna.is_authenticated());
        assert_eq!(dna.transport().last_plain_command, data);
    }
}
