//! Command codes: the first `u32` of every control packet's tag-struct payload, before the
//! dispatcher's own 32-bit correlation tag.
//!
//! Not an exhaustive transcription of the real daemon's command table — only the subset this
//! crate's context/stream/introspection surface actually emits or expects — but ordered and
//! named the way that table is, so a reader familiar with the protocol recognizes it immediately.

/// A command or reply identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum Command {
    Error,
    Timeout,
    Reply,

    CreatePlaybackStream,
    DeletePlaybackStream,
    CreateRecordStream,
    DeleteRecordStream,
    Exit,
    Auth,
    SetClientName,
    LookupSink,
    LookupSource,
    DrainPlaybackStream,
    Stat,
    GetPlaybackLatency,
    CreateUploadStream,
    DeleteUploadStream,
    FinishUploadStream,
    PlaySample,
    RemoveSample,

    GetServerInfo,
    GetSinkInfo,
    GetSinkInfoList,
    GetSourceInfo,
    GetSourceInfoList,
    GetModuleInfo,
    GetModuleInfoList,
    GetClientInfo,
    GetClientInfoList,
    GetSinkInputInfo,
    GetSinkInputInfoList,
    GetSourceOutputInfo,
    GetSourceOutputInfoList,
    GetSampleInfo,
    GetSampleInfoList,
    Subscribe,

    SetSinkVolume,
    SetSinkInputVolume,
    SetSourceVolume,

    SetSinkMute,
    SetSourceMute,
    SetSinkInputMute,

    CorkPlaybackStream,
    FlushPlaybackStream,
    TriggerPlaybackStream,

    SetDefaultSink,
    SetDefaultSource,

    SetPlaybackStreamName,
    SetRecordStreamName,

    KillClient,
    KillSinkInput,
    KillSourceOutput,

    LoadModule,
    UnloadModule,

    GetRecordLatency,
    CorkRecordStream,
    FlushRecordStream,
    PrebufPlaybackStream,

    /// Server-to-client unsolicited notifications, still dispatched by command id.
    Request,
    Overflow,
    Underflow,
    PlaybackStreamKilled,
    RecordStreamKilled,
    SubscribeEvent,

    StreamMoved,
    StreamSuspended,
    StreamStarted,
    StreamEvent,
    StreamBufferAttrChanged,

    UpdateClientProplist,
    RemoveClientProplist,

    /// Unknown command id, as received; the payload is preserved for diagnostics.
    Unknown(u32),
}

impl Command {
    pub fn to_wire(self) -> u32 {
        match self {
            Command::Error => 0,
            Command::Timeout => 1,
            Command::Reply => 2,
            Command::CreatePlaybackStream => 3,
            Command::DeletePlaybackStream => 4,
            Command::CreateRecordStream => 5,
            Command::DeleteRecordStream => 6,
            Command::Exit => 7,
            Command::Auth => 8,
            Command::SetClientName => 9,
            Command::LookupSink => 10,
            Command::LookupSource => 11,
            Command::DrainPlaybackStream => 12,
            Command::Stat => 13,
            Command::GetPlaybackLatency => 14,
            Command::CreateUploadStream => 15,
            Command::DeleteUploadStream => 16,
            Command::FinishUploadStream => 17,
            Command::PlaySample => 18,
            Command::RemoveSample => 19,
            Command::GetServerInfo => 20,
            Command::GetSinkInfo => 21,
            Command::GetSinkInfoList => 22,
            Command::GetSourceInfo => 23,
            Command::GetSourceInfoList => 24,
            Command::GetModuleInfo => 25,
            Command::GetModuleInfoList => 26,
            Command::GetClientInfo => 27,
            Command::GetClientInfoList => 28,
            Command::GetSinkInputInfo => 29,
            Command::GetSinkInputInfoList => 30,
            Command::GetSourceOutputInfo => 31,
            Command::GetSourceOutputInfoList => 32,
            Command::GetSampleInfo => 33,
            Command::GetSampleInfoList => 34,
            Command::Subscribe => 35,
            Command::SetSinkVolume => 36,
            Command::SetSinkInputVolume => 37,
            Command::SetSourceVolume => 38,
            Command::SetSinkMute => 39,
            Command::SetSourceMute => 40,
            Command::SetSinkInputMute => 41,
            Command::CorkPlaybackStream => 42,
            Command::FlushPlaybackStream => 43,
            Command::TriggerPlaybackStream => 44,
            Command::SetDefaultSink => 45,
            Command::SetDefaultSource => 46,
            Command::SetPlaybackStreamName => 47,
            Command::SetRecordStreamName => 48,
            Command::KillClient => 49,
            Command::KillSinkInput => 50,
            Command::KillSourceOutput => 51,
            Command::LoadModule => 52,
            Command::UnloadModule => 53,
            Command::GetRecordLatency => 54,
            Command::CorkRecordStream => 55,
            Command::FlushRecordStream => 56,
            Command::PrebufPlaybackStream => 57,
            Command::Request => 58,
            Command::Overflow => 59,
            Command::Underflow => 60,
            Command::PlaybackStreamKilled => 61,
            Command::RecordStreamKilled => 62,
            Command::SubscribeEvent => 63,
            Command::StreamMoved => 64,
            Command::StreamSuspended => 65,
            Command::StreamStarted => 66,
            Command::StreamEvent => 67,
            Command::StreamBufferAttrChanged => 68,
            Command::UpdateClientProplist => 69,
            Command::RemoveClientProplist => 70,
            Command::Unknown(n) => n,
        }
    }

    pub fn from_wire(v: u32) -> Self {
        match v {
            0 => Command::Error,
            1 => Command::Timeout,
            2 => Command::Reply,
            3 => Command::CreatePlaybackStream,
            4 => Command::DeletePlaybackStream,
            5 => Command::CreateRecordStream,
            6 => Command::DeleteRecordStream,
            7 => Command::Exit,
            8 => Command::Auth,
            9 => Command::SetClientName,
            10 => Command::LookupSink,
            11 => Command::LookupSource,
            12 => Command::DrainPlaybackStream,
            13 => Command::Stat,
            14 => Command::GetPlaybackLatency,
            15 => Command::CreateUploadStream,
            16 => Command::DeleteUploadStream,
            17 => Command::FinishUploadStream,
            18 => Command::PlaySample,
            19 => Command::RemoveSample,
            20 => Command::GetServerInfo,
            21 => Command::GetSinkInfo,
            22 => Command::GetSinkInfoList,
            23 => Command::GetSourceInfo,
            24 => Command::GetSourceInfoList,
            25 => Command::GetModuleInfo,
            26 => Command::GetModuleInfoList,
            27 => Command::GetClientInfo,
            28 => Command::GetClientInfoList,
            29 => Command::GetSinkInputInfo,
            30 => Command::GetSinkInputInfoList,
            31 => Command::GetSourceOutputInfo,
            32 => Command::GetSourceOutputInfoList,
            33 => Command::GetSampleInfo,
            34 => Command::GetSampleInfoList,
            35 => Command::Subscribe,
            36 => Command::SetSinkVolume,
            37 => Command::SetSinkInputVolume,
            38 => Command::SetSourceVolume,
            39 => Command::SetSinkMute,
            40 => Command::SetSourceMute,
            41 => Command::SetSinkInputMute,
            42 => Command::CorkPlaybackStream,
            43 => Command::FlushPlaybackStream,
            44 => Command::TriggerPlaybackStream,
            45 => Command::SetDefaultSink,
            46 => Command::SetDefaultSource,
            47 => Command::SetPlaybackStreamName,
            48 => Command::SetRecordStreamName,
            49 => Command::KillClient,
            50 => Command::KillSinkInput,
            51 => Command::KillSourceOutput,
            52 => Command::LoadModule,
            53 => Command::UnloadModule,
            54 => Command::GetRecordLatency,
            55 => Command::CorkRecordStream,
            56 => Command::FlushRecordStream,
            57 => Command::PrebufPlaybackStream,
            58 => Command::Request,
            59 => Command::Overflow,
            60 => Command::Underflow,
            61 => Command::PlaybackStreamKilled,
            62 => Command::RecordStreamKilled,
            63 => Command::SubscribeEvent,
            64 => Command::StreamMoved,
            65 => Command::StreamSuspended,
            66 => Command::StreamStarted,
            67 => Command::StreamEvent,
            68 => Command::StreamBufferAttrChanged,
            69 => Command::UpdateClientProplist,
            70 => Command::RemoveClientProplist,
            n => Command::Unknown(n),
        }
    }

    /// Whether this command, received unsolicited (not as a reply), is one that belongs to a
    /// stream's event stream rather than the context's.
    pub fn is_stream_event(self) -> bool {
        matches!(
            self,
            Command::Request
                | Command::Overflow
                | Command::Underflow
                | Command::PlaybackStreamKilled
                | Command::RecordStreamKilled
                | Command::StreamMoved
                | Command::StreamSuspended
                | Command::StreamStarted
                | Command::StreamEvent
                | Command::StreamBufferAttrChanged
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_round_trip_for_known_commands() {
        for c in [Command::Auth, Command::Request, Command::StreamMoved, Command::Reply] {
            assert_eq!(Command::from_wire(c.to_wire()), c);
        }
    }

    #[test]
    fn unrecognized_code_preserved_as_unknown() {
        assert_eq!(Command::from_wire(9999), Command::Unknown(9999));
    }
}
