// AES in cipher block chaining mode. Padding is the caller's job: both
// directions take a buffer that is already a whole number of blocks.
use crate::aes::{AesCipher, BLOCK_SIZE};
use crate::{ChannelError, Result};

pub fn encrypt_cbc(plaintext: &[u8], key: &[u8], iv: &[u8; BLOCK_SIZE]) -> Result<Vec<u8>> {
    check_block_aligned(plaintext)?;
    let cipher = AesCipher::new(key)?;

    let mut ciphertext = Vec::with_capacity(plaintext.len());
    let mut last_block = *iv;
    for plaintext_block in plaintext.chunks_exact(BLOCK_SIZE) {
        let mut block = last_block;
        xor_in_place(&mut block, plaintext_block);
        cipher.encrypt_block(&mut block);
        ciphertext.extend_from_slice(&block);
        last_block = block;
    }
    Ok(ciphertext)
}

pub fn decrypt_cbc(ciphertext: &[u8], key: &[u8], iv: &[u8; BLOCK_SIZE]) -> Result<Vec<u8>> {
    check_block_aligned(ciphertext)?;
    let cipher = AesCipher::new(key)?;

    let mut plaintext = Vec::with_capacity(ciphertext.len());
    let mut last_block: &[u8] = iv;
    for ciphertext_block in ciphertext.chunks_exact(BLOCK_SIZE) {
        let mut block = [0u8; BLOCK_SIZE];
        block.copy_from_slice(ciphertext_block);
        cipher.decrypt_block(&mut block);
        // Chain on the received ciphertext, never on recovered plaintext.
        xor_in_place(&mut block, last_block);
        plaintext.extend_from_slice(&block);
        last_block = ciphertext_block;
    }
    Ok(plaintext)
}

fn check_block_aligned(buf: &[u8]) -> Result<()> {
    if buf.is_empty() || buf.len() % BLOCK_SIZE != 0 {
        return Err(ChannelError::InvalidLength(buf.len()));
    }
    Ok(())
}

fn xor_in_place(block: &mut [u8; BLOCK_SIZE], other: &[u8]) {
    block.iter_mut().zip(other).for_each(|(b, o)| *b ^= o);
}
