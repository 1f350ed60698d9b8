//! 登录参数加密。
//!
//! 教务系统在浏览器端用一个 DES 变体加密登录参数：明文与密钥都按
//! UTF-16 码元每 4 个切成一个 64 位分组（不足补零），密钥的每个分组
//! 依次对数据加密一轮，输出为大写十六进制。与标准 DES 的区别只在于
//! PC-1 置换按列取位，其余 IP/E/S/P/PC-2/FP 都是标准表。

use crate::{Error, Result};

/// 可插拔的加密策略：`encrypt(plaintext, key) -> hex`
pub trait Cipher: Send + Sync {
    fn encrypt(&self, plaintext: &str, key: &str) -> Result<String>;
}

type Block = [u8; 64];

const IP: [u8; 64] = [
    58, 50, 42, 34, 26, 18, 10, 2, 60, 52, 44, 36, 28, 20, 12, 4, 62, 54, 46, 38, 30, 22, 14, 6,
    64, 56, 48, 40, 32, 24, 16, 8, 57, 49, 41, 33, 25, 17, 9, 1, 59, 51, 43, 35, 27, 19, 11, 3, 61,
    53, 45, 37, 29, 21, 13, 5, 63, 55, 47, 39, 31, 23, 15, 7,
];

const FP: [u8; 64] = [
    40, 8, 48, 16, 56, 24, 64, 32, 39, 7, 47, 15, 55, 23, 63, 31, 38, 6, 46, 14, 54, 22, 62, 30,
    37, 5, 45, 13, 53, 21, 61, 29, 36, 4, 44, 12, 52, 20, 60, 28, 35, 3, 43, 11, 51, 19, 59, 27,
    34, 2, 42, 10, 50, 18, 58, 26, 33, 1, 41, 9, 49, 17, 57, 25,
];

const E: [u8; 48] = [
    32, 1, 2, 3, 4, 5, 4, 5, 6, 7, 8, 9, 8, 9, 10, 11, 12, 13, 12, 13, 14, 15, 16, 17, 16, 17, 18,
    19, 20, 21, 20, 21, 22, 23, 24, 25, 24, 25, 26, 27, 28, 29, 28, 29, 30, 31, 32, 1,
];

const P: [u8; 32] = [
    16, 7, 20, 21, 29, 12, 28, 17, 1, 15, 23, 26, 5, 18, 31, 10, 2, 8, 24, 14, 32, 27, 3, 9, 19,
    13, 30, 6, 22, 11, 4, 25,
];

const PC2: [u8; 48] = [
    14, 17, 11, 24, 1, 5, 3, 28, 15, 6, 21, 10, 23, 19, 12, 4, 26, 8, 16, 7, 27, 20, 13, 2, 41, 52,
    31, 37, 47, 55, 30, 40, 51, 45, 33, 48, 44, 49, 39, 56, 34, 53, 46, 42, 50, 36, 29, 32,
];

const SHIFTS: [usize; 16] = [1, 1, 2, 2, 2, 2, 2, 2, 1, 2, 2, 2, 2, 2, 2, 1];

const S_BOXES: [[[u8; 16]; 4]; 8] = [
    [
        [14, 4, 13, 1, 2, 15, 11, 8, 3, 10, 6, 12, 5, 9, 0, 7],
        [0, 15, 7, 4, 14, 2, 13, 1, 10, 6, 12, 11, 9, 5, 3, 8],
        [4, 1, 14, 8, 13, 6, 2, 11, 15, 12, 9, 7, 3, 10, 5, 0],
        [15, 12, 8, 2, 4, 9, 1, 7, 5, 11, 3, 14, 10, 0, 6, 13],
    ],
    [
        [15, 1, 8, 14, 6, 11, 3, 4, 9, 7, 2, 13, 12, 0, 5, 10],
        [3, 13, 4, 7, 15, 2, 8, 14, 12, 0, 1, 10, 6, 9, 11, 5],
        [0, 14, 7, 11, 10, 4, 13, 1, 5, 8, 12, 6, 9, 3, 2, 15],
        [13, 8, 10, 1, 3, 15, 4, 2, 11, 6, 7, 12, 0, 5, 14, 9],
    ],
    [
        [10, 0, 9, 14, 6, 3, 15, 5, 1, 13, 12, 7, 11, 4, 2, 8],
        [13, 7, 0, 9, 3, 4, 6, 10, 2, 8, 5, 14, 12, 11, 15, 1],
        [13, 6, 4, 9, 8, 15, 3, 0, 11, 1, 2, 12, 5, 10, 14, 7],
        [1, 10, 13, 0, 6, 9, 8, 7, 4, 15, 14, 3, 11, 5, 2, 12],
    ],
    [
        [7, 13, 14, 3, 0, 6, 9, 10, 1, 2, 8, 5, 11, 12, 4, 15],
        [13, 8, 11, 5, 6, 15, 0, 3, 4, 7, 2, 12, 1, 10, 14, 9],
        [10, 6, 9, 0, 12, 11, 7, 13, 15, 1, 3, 14, 5, 2, 8, 4],
        [3, 15, 0, 6, 10, 1, 13, 8, 9, 4, 5, 11, 12, 7, 2, 14],
    ],
    [
        [2, 12, 4, 1, 7, 10, 11, 6, 8, 5, 3, 15, 13, 0, 14, 9],
        [14, 11, 2, 12, 4, 7, 13, 1, 5, 0, 15, 10, 3, 9, 8, 6],
        [4, 2, 1, 11, 10, 13, 7, 8, 15, 9, 12, 5, 6, 3, 0, 14],
        [11, 8, 12, 7, 1, 14, 2, 13, 6, 15, 0, 9, 10, 4, 5, 3],
    ],
    [
        [12, 1, 10, 15, 9, 2, 6, 8, 0, 13, 3, 4, 14, 7, 5, 11],
        [10, 15, 4, 2, 7, 12, 9, 5, 6, 1, 13, 14, 0, 11, 3, 8],
        [9, 14, 15, 5, 2, 8, 12, 3, 7, 0, 4, 10, 1, 13, 11, 6],
        [4, 3, 2, 12, 9, 5, 15, 10, 11, 14, 1, 7, 6, 0, 8, 13],
    ],
    [
        [4, 11, 2, 14, 15, 0, 8, 13, 3, 12, 9, 7, 5, 10, 6, 1],
        [13, 0, 11, 7, 4, 9, 1, 10, 14, 3, 5, 12, 2, 15, 8, 6],
        [1, 4, 11, 13, 12, 3, 7, 14, 10, 15, 6, 8, 0, 5, 9, 2],
        [6, 11, 13, 8, 1, 4, 10, 7, 9, 5, 0, 15, 14, 2, 3, 12],
    ],
    [
        [13, 2, 8, 4, 6, 15, 11, 1, 10, 9, 3, 14, 5, 0, 12, 7],
        [1, 15, 13, 8, 10, 3, 7, 4, 12, 5, 6, 11, 0, 14, 9, 2],
        [7, 11, 4, 1, 9, 12, 14, 2, 0, 6, 10, 13, 15, 3, 5, 8],
        [2, 1, 14, 7, 4, 10, 8, 13, 15, 12, 9, 0, 3, 5, 6, 11],
    ],
];

/// 表项为 1 起始的位序号
fn permute<const N: usize>(input: &[u8], table: &[u8; N]) -> [u8; N] {
    let mut out = [0u8; N];
    for (slot, &pos) in out.iter_mut().zip(table) {
        *slot = input[usize::from(pos) - 1];
    }
    out
}

/// 4 个 UTF-16 码元 -> 64 位，每个码元高位在前，不足 4 个补零
fn units_to_block(units: &[u16]) -> Block {
    let mut block = [0u8; 64];
    for (i, &unit) in units.iter().take(4).enumerate() {
        for j in 0..16 {
            block[16 * i + j] = u8::from((unit >> (15 - j)) & 1 == 1);
        }
    }
    block
}

fn block_to_hex(block: &Block) -> String {
    block
        .chunks(4)
        .map(|nibble| {
            let v = nibble.iter().fold(0u32, |acc, &b| (acc << 1) | u32::from(b));
            char::from_digit(v, 16).map_or('0', |c| c.to_ascii_uppercase())
        })
        .collect()
}

/// 16 轮子密钥
fn round_keys(key: &Block) -> [[u8; 48]; 16] {
    // 变体 PC-1：第 i 列自下而上取 7 列，忽略每字节最低位
    let mut cd = [0u8; 56];
    for i in 0..7 {
        for j in 0..8 {
            cd[i * 8 + j] = key[8 * (7 - j) + i];
        }
    }

    let mut keys = [[0u8; 48]; 16];
    for (round, &shift) in SHIFTS.iter().enumerate() {
        cd[..28].rotate_left(shift);
        cd[28..].rotate_left(shift);
        keys[round] = permute(&cd, &PC2);
    }
    keys
}

fn feistel(right: &[u8; 32], subkey: &[u8; 48]) -> [u8; 32] {
    let mut expanded = permute(right, &E);
    for (bit, k) in expanded.iter_mut().zip(subkey) {
        *bit ^= k;
    }

    let mut substituted = [0u8; 32];
    for (m, six) in expanded.chunks(6).enumerate() {
        let row = usize::from(six[0] * 2 + six[5]);
        let col = usize::from(six[1] * 8 + six[2] * 4 + six[3] * 2 + six[4]);
        let v = S_BOXES[m][row][col];
        for j in 0..4 {
            substituted[m * 4 + j] = (v >> (3 - j)) & 1;
        }
    }
    permute(&substituted, &P)
}

fn crypt_block(data: &Block, key: &Block, decrypt: bool) -> Block {
    let keys = round_keys(key);
    let ip = permute(data, &IP);
    let mut left = [0u8; 32];
    let mut right = [0u8; 32];
    left.copy_from_slice(&ip[..32]);
    right.copy_from_slice(&ip[32..]);

    for round in 0..16 {
        let subkey = if decrypt {
            &keys[15 - round]
        } else {
            &keys[round]
        };
        let mut next = feistel(&right, subkey);
        for (bit, l) in next.iter_mut().zip(&left) {
            *bit ^= l;
        }
        left = right;
        right = next;
    }

    let mut preoutput = [0u8; 64];
    preoutput[..32].copy_from_slice(&right);
    preoutput[32..].copy_from_slice(&left);
    permute(&preoutput, &FP)
}

/// 教务系统 `strEnc` 的本地实现（仅使用第一把密钥）
#[derive(Debug, Clone, Copy, Default)]
pub struct KingoDes;

impl KingoDes {
    pub fn new() -> Self {
        Self
    }

    fn key_blocks(key: &str) -> Result<Vec<Block>> {
        let units: Vec<u16> = key.encode_utf16().collect();
        if units.is_empty() {
            return Err(Error::Protocol("cipher key is empty".to_string()));
        }
        Ok(units.chunks(4).map(units_to_block).collect())
    }
}

impl Cipher for KingoDes {
    fn encrypt(&self, plaintext: &str, key: &str) -> Result<String> {
        let keys = Self::key_blocks(key)?;
        let units: Vec<u16> = plaintext.encode_utf16().collect();

        let mut hex = String::with_capacity(units.len().div_ceil(4) * 16);
        for chunk in units.chunks(4) {
            let block = keys
                .iter()
                .fold(units_to_block(chunk), |acc, k| crypt_block(&acc, k, false));
            hex.push_str(&block_to_hex(&block));
        }
        Ok(hex)
    }
}
