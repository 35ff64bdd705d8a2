use crate::frame::format;

/// Audio codec preference order, borrowed from Asterisk: start with the
/// G.711 variants that all telephony equipment speaks, then the easy
/// translations, then the vocoders from best to worst.
pub const AUDIO_PREFS: [u32; 12] = [
    format::ULAW,
    format::ALAW,
    format::SLINEAR,
    format::G726,
    format::G726_AAL2,
    format::ADPCM,
    format::GSM,
    format::ILBC,
    format::SPEEX,
    format::LPC10,
    format::G729A,
    format::G723_1,
];

/// Video format preference order.
pub const VIDEO_PREFS: [u32; 6] = [
    format::JPEG,
    format::PNG,
    format::H261,
    format::H263,
    format::H263_PLUS,
    format::H264,
];

/// Resolve the formats to use for a call from our capabilities and the
/// peer's. At most one audio bit and one video bit are selected, each the
/// first preference present in the intersection; 0 when nothing is
/// common.
pub fn choose_formats(own_caps: u32, peer_caps: u32) -> u32 {
    let common = own_caps & peer_caps;
    let mut res = 0;

    if common & format::AUDIO_MASK != 0 {
        for pref in AUDIO_PREFS {
            if common & pref != 0 {
                res = pref;
                break;
            }
        }
    }

    if common & format::VIDEO_MASK != 0 {
        for pref in VIDEO_PREFS {
            if common & pref != 0 {
                res |= pref;
                break;
            }
        }
    }

    res
}

/// Our opinion of the best format for the given capability set. This can
/// be two formats, one audio and one video.
pub fn preferred_format(caps: u32) -> u32 {
    choose_formats(caps, caps)
}
