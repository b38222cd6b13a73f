//! Tag codes, value types and enumerated tag values of the TIFF / TIFF-EP / DNG specs.

use std::fmt::{Display, Formatter};

macro_rules! tag_namespace {
    ($(#[$meta:meta])* $namespace:ident { $($name:ident = $code:expr,)* }) => {
        $(#[$meta])*
        #[allow(non_upper_case_globals)]
        pub mod $namespace {
            $(pub const $name: u32 = $code;)*

            pub(crate) const ALL: &[(u32, &str)] = &[$(($code, stringify!($name)),)*];
        }
    };
}

tag_namespace!(
    /// Tags that can appear in a (sub-)IFD holding image data.
    ifd {
        NewSubFileType = 254,
        ImageWidth = 256,
        ImageLength = 257,
        BitsPerSample = 258,
        Compression = 259,
        PhotometricInterpretation = 262,
        FillOrder = 266,
        StripOffsets = 273,
        Orientation = 274,
        SamplesPerPixel = 277,
        RowsPerStrip = 278,
        StripByteCounts = 279,
        XResolution = 282,
        YResolution = 283,
        PlanarConfiguration = 284,
        ResolutionUnit = 296,
        DateTime = 306,
        XMP = 700,
        Predictor = 317,
        TileWidth = 322,
        TileLength = 323,
        TileOffsets = 324,
        TileByteCounts = 325,
        SubIFDs = 330,
        ExtraSamples = 338,
        SampleFormat = 339,
        JPEGTables = 347,
        JPEGInterchangeFormat = 513,
        JPEGInterchangeFormatLength = 514,
        YCbCrCoefficients = 529,
        YCbCrSubSampling = 530,
        YCbCrPositioning = 531,
        ReferenceBlackWhite = 532,
        CFARepeatPatternDim = 33421,
        CFAPattern = 33422,
        Copyright = 33432,
        ExifIFD = 34665,
        DNGVersion = 50706,
        DNGBackwardVersion = 50707,
        UniqueCameraModel = 50708,
        CFAPlaneColor = 50710,
        CFALayout = 50711,
        LinearizationTable = 50712,
        BlackLevelRepeatDim = 50713,
        BlackLevel = 50714,
        BlackLevelDeltaH = 50715,
        BlackLevelDeltaV = 50716,
        WhiteLevel = 50717,
        DefaultScale = 50718,
        DefaultCropOrigin = 50719,
        DefaultCropSize = 50720,
        ColorMatrix1 = 50721,
        AsShotNeutral = 50728,
        BayerGreenSplit = 50733,
        ChromaBlurRadius = 50737,
        AntiAliasStrength = 50738,
        BestQualityScale = 50780,
        ActiveArea = 50829,
        MaskedAreas = 50830,
        PreviewApplicationName = 50966,
        PreviewApplicationVersion = 50967,
        PreviewSettingsName = 50968,
        PreviewSettingsDigest = 50969,
        PreviewColorSpace = 50970,
        PreviewDateTime = 50971,
        SubTileBlockSize = 50974,
        RowInterleaveFactor = 50975,
        OpcodeList1 = 51008,
        OpcodeList2 = 51009,
        OpcodeList3 = 51022,
    }
);

tag_namespace!(
    /// Tags of the EXIF directory that the reader understands.
    exif {
        UserComment = 37510,
    }
);

/// Parent codes identify the directory a tag was found in.
///
/// IFD0 has the parent code 0; SubIFDs and chained IFDs are numbered from their first code.
pub mod parent {
    pub const IFD0: u32 = 0;
    pub const EXIF_IFD: u32 = super::ifd::ExifIFD;
    pub const GPS_INFO: u32 = 34853;
    pub const INTEROPERABILITY_IFD: u32 = 40965;

    pub const FIRST_SUB_IFD: u32 = 0x10000;
    pub const LAST_SUB_IFD: u32 = 0x1FFFF;
    pub const FIRST_CHAINED_IFD: u32 = 0x20000;
    pub const LAST_CHAINED_IFD: u32 = 0x2FFFF;
    pub const FIRST_MAKER_NOTE_IFD: u32 = 0x30000;
}

/// Looks up the name of a tag, taking the directory it appeared in into account.
pub fn tag_name(parent_code: u32, tag_code: u32) -> Option<&'static str> {
    let lookup = |namespace: &[(u32, &'static str)]| {
        namespace
            .iter()
            .find(|(code, _)| *code == tag_code)
            .map(|(_, name)| *name)
    };
    if parent_code == parent::EXIF_IFD {
        lookup(exif::ALL).or_else(|| lookup(ifd::ALL))
    } else {
        lookup(ifd::ALL)
    }
}

/// The data-type of an IFD value.
///
/// This does not include the fact that it is possible to have a list of every type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IfdValueType {
    Byte,
    Ascii,
    Short,
    Long,
    Rational,
    SignedByte,
    Undefined,
    SignedShort,
    SignedLong,
    SignedRational,
    Float,
    Double,
    Ifd,
    Long8,
    SignedLong8,
    Ifd8,
}

impl TryFrom<u16> for IfdValueType {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Byte),
            2 => Ok(Self::Ascii),
            3 => Ok(Self::Short),
            4 => Ok(Self::Long),
            5 => Ok(Self::Rational),
            6 => Ok(Self::SignedByte),
            7 => Ok(Self::Undefined),
            8 => Ok(Self::SignedShort),
            9 => Ok(Self::SignedLong),
            10 => Ok(Self::SignedRational),
            11 => Ok(Self::Float),
            12 => Ok(Self::Double),
            13 => Ok(Self::Ifd),
            16 => Ok(Self::Long8),
            17 => Ok(Self::SignedLong8),
            18 => Ok(Self::Ifd8),
            _ => Err(format!("Unknown value type: {}", value)),
        }
    }
}

impl From<IfdValueType> for u16 {
    fn from(value: IfdValueType) -> Self {
        match value {
            IfdValueType::Byte => 1,
            IfdValueType::Ascii => 2,
            IfdValueType::Short => 3,
            IfdValueType::Long => 4,
            IfdValueType::Rational => 5,
            IfdValueType::SignedByte => 6,
            IfdValueType::Undefined => 7,
            IfdValueType::SignedShort => 8,
            IfdValueType::SignedLong => 9,
            IfdValueType::SignedRational => 10,
            IfdValueType::Float => 11,
            IfdValueType::Double => 12,
            IfdValueType::Ifd => 13,
            IfdValueType::Long8 => 16,
            IfdValueType::SignedLong8 => 17,
            IfdValueType::Ifd8 => 18,
        }
    }
}

impl IfdValueType {
    /// Size of a single value of this type in bytes.
    pub fn size(&self) -> usize {
        match self {
            IfdValueType::Byte => 1,
            IfdValueType::Ascii => 1,
            IfdValueType::Short => 2,
            IfdValueType::Long => 4,
            IfdValueType::Rational => 8,
            IfdValueType::SignedByte => 1,
            IfdValueType::Undefined => 1,
            IfdValueType::SignedShort => 2,
            IfdValueType::SignedLong => 4,
            IfdValueType::SignedRational => 8,
            IfdValueType::Float => 4,
            IfdValueType::Double => 8,
            IfdValueType::Ifd => 4,
            IfdValueType::Long8 => 8,
            IfdValueType::SignedLong8 => 8,
            IfdValueType::Ifd8 => 8,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            IfdValueType::Byte => "Byte",
            IfdValueType::Ascii => "ASCII",
            IfdValueType::Short => "Short",
            IfdValueType::Long => "Long",
            IfdValueType::Rational => "Rational",
            IfdValueType::SignedByte => "SByte",
            IfdValueType::Undefined => "Undefined",
            IfdValueType::SignedShort => "SShort",
            IfdValueType::SignedLong => "SLong",
            IfdValueType::SignedRational => "SRational",
            IfdValueType::Float => "Float",
            IfdValueType::Double => "Double",
            IfdValueType::Ifd => "IFD",
            IfdValueType::Long8 => "Long8",
            IfdValueType::SignedLong8 => "SLong8",
            IfdValueType::Ifd8 => "IFD8",
        }
    }
}

impl Display for IfdValueType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

macro_rules! code_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $code:literal => $label:expr,)* }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant = $code,)*
        }

        impl TryFrom<u32> for $name {
            type Error = u32;

            fn try_from(value: u32) -> Result<Self, Self::Error> {
                match value {
                    $($code => Ok(Self::$variant),)*
                    other => Err(other),
                }
            }
        }

        impl From<$name> for u32 {
            fn from(value: $name) -> Self {
                value as u32
            }
        }

        impl $name {
            pub fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant => $label,)*
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

code_enum!(
    /// Value of the NewSubFileType tag.
    SubFileType {
        MainImage = 0 => "Main Image",
        PreviewImage = 1 => "Preview Image",
        AltPreviewImage = 0x10001 => "Alt Preview Image",
    }
);

code_enum!(
    Compression {
        Uncompressed = 1 => "Uncompressed",
        Lzw = 5 => "LZW",
        OldJpeg = 6 => "Old JPEG",
        Jpeg = 7 => "JPEG",
        Deflate = 8 => "Deflate",
        PackBits = 32773 => "PackBits",
        OldDeflate = 32946 => "OldDeflate",
    }
);

code_enum!(
    PhotometricInterpretation {
        WhiteIsZero = 0 => "WhiteIsZero",
        BlackIsZero = 1 => "BlackIsZero",
        Rgb = 2 => "RGB",
        RgbPalette = 3 => "RGBPalette",
        TransparencyMask = 4 => "TransparencyMask",
        Cmyk = 5 => "CMYK",
        YCbCr = 6 => "YCbCr",
        CieLab = 8 => "CIELab",
        IccLab = 9 => "ICCLab",
        Cfa = 32803 => "CFA",
        LinearRaw = 34892 => "LinearRaw",
    }
);

code_enum!(
    /// `RowInterleaved` is not a TIFF value; it describes planes stored row by row.
    PlanarConfiguration {
        Interleaved = 1 => "Interleaved",
        Planar = 2 => "Planar",
        RowInterleaved = 100000 => "RowInterleaved",
    }
);

code_enum!(
    Predictor {
        NullPredictor = 1 => "None",
        Horizontal = 2 => "Horizontal",
        FloatingPoint = 3 => "Floating Point",
    }
);

code_enum!(
    SampleFormat {
        UnsignedInteger = 1 => "Unsigned Integer",
        SignedInteger = 2 => "Signed Integer",
        FloatingPoint = 3 => "Floating Point",
        Undefined = 4 => "Undefined",
    }
);

code_enum!(
    PreviewColorSpace {
        Unknown = 0 => "Unknown",
        GrayGamma22 = 1 => "Gray Gamma 2.2",
        Srgb = 2 => "sRGB",
        AdobeRgb = 3 => "Adobe RGB (1998)",
        ProPhotoRgb = 4 => "Pro Photo RGB",
    }
);

code_enum!(
    CfaColor {
        Red = 0 => "Red",
        Green = 1 => "Green",
        Blue = 2 => "Blue",
        Cyan = 3 => "Cyan",
        Magenta = 4 => "Magenta",
        Yellow = 5 => "Yellow",
        White = 6 => "White",
    }
);

code_enum!(
    CfaLayout {
        Rectangular = 1 => "Rectangular",
        EvenColumnsOffsetDown = 2 => "Even Columns Offset Down 1/2 Row",
        EvenColumnsOffsetUp = 3 => "Even Columns Offset Up 1/2 Row",
        EvenRowsOffsetRight = 4 => "Even Rows Offset Right 1/2 Column",
        EvenRowsOffsetLeft = 5 => "Even Rows Offset Left 1/2 Column",
        EvenRowsOffsetUpRight = 6 => "Even Rows Offset Up by 1/4 Row, Even Columns Offset Left by 1/4 Column",
        EvenRowsOffsetUpLeft = 7 => "Even Rows Offset Right by 1/4 Row, Even Columns Offset Up by 1/4 Column",
        EvenRowsOffsetDownLeft = 8 => "Even Rows Offset Down by 1/4 Row, Even Columns Offset Left by 1/4 Column",
        EvenRowsOffsetDownRight = 9 => "Even Rows Offset Down by 1/4 Row, Even Columns Offset Right by 1/4 Column",
    }
);

/// Packed DNG versions (`0xMMmmbbpp`).
pub mod dng_version {
    pub const V1_0_0_0: u32 = 0x01000000;
    pub const V1_1_0_0: u32 = 0x01010000;
    pub const V1_2_0_0: u32 = 0x01020000;
    pub const V1_3_0_0: u32 = 0x01030000;
    /// The newest version this crate knows how to read.
    pub const CURRENT: u32 = V1_3_0_0;
}
